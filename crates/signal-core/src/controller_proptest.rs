#[cfg(test)]
mod proptest_controller {
    use crate::gap;
    use crate::masks::{CnaMask, Phase, PhaseMask, RingMask};
    use crate::monitor;
    use crate::ring::{BarrierState, Interval, PedInterval, Ring};
    use crate::timing::{Configuration, TimingParam, TimingTable};
    use crate::{
        BarrierCrossState, Controller, ControllerInputs, InputState, InvariantPolicy, RingControls,
    };
    use proptest::prelude::*;

    fn config() -> Configuration {
        // min, passage, max1, max2, walk, ped clear, yellow, red clear, spa, ttr, before, min gap
        let row = [30, 15, 80, 100, 20, 25, 10, 5, 10, 40, 10, 5];
        Configuration {
            timing: TimingTable::uniform(row),
            ..Configuration::default()
        }
    }

    /// One stretch of constant inputs.
    #[derive(Debug, Clone)]
    struct Segment {
        ticks: u32,
        inputs: InputState,
    }

    fn input_state() -> impl Strategy<Value = InputState> {
        (
            any::<u8>(),
            any::<u8>(),
            prop::bool::weighted(0.1),
            any::<u8>(),
            prop::bool::weighted(0.1),
            0u8..4,
            0u8..4,
            0u8..4,
            any::<u8>(),
            0u8..4,
            any::<u8>(),
        )
            .prop_map(
                |(vehicle, ped, use_hold, hold, use_omit, force_off, stop, inhibit, ring_control, cna, inputs)| {
                    let mut rings = RingControls::default();
                    rings.apply_ring_control(ring_control);
                    rings.force_off = RingMask::from_bits(force_off);
                    rings.stop_timing = RingMask::from_bits(stop & force_off);
                    rings.inhibit_max_termination = RingMask::from_bits(inhibit);
                    InputState {
                        vehicle_detector: PhaseMask::from_bits(vehicle),
                        ped_detector: PhaseMask::from_bits(ped),
                        hold: if use_hold { PhaseMask::from_bits(hold) } else { PhaseMask::EMPTY },
                        ped_omit: PhaseMask::EMPTY,
                        phase_omit: if use_omit { PhaseMask::from_bits(hold & 0x44) } else { PhaseMask::EMPTY },
                        vehicle_memory: PhaseMask::from_bits(!ped),
                        rings,
                        call_to_non_actuated: CnaMask::from_bits(cna),
                        inputs: ControllerInputs::from_bits(inputs & 0x7F),
                    }
                },
            )
    }

    fn segments() -> impl Strategy<Value = Vec<Segment>> {
        prop::collection::vec(
            (1u32..40, input_state()).prop_map(|(ticks, inputs)| Segment { ticks, inputs }),
            1..30,
        )
    }

    fn controller() -> Controller {
        let mut controller = Controller::with_policy(config(), InvariantPolicy::Panic);
        controller.initialize(0);
        controller
    }

    fn phase_in_ring(ring: &Ring, r: usize) -> bool {
        ring.phase.map_or(true, |phase| phase.ring() == r)
            && ring.next_phase.map_or(true, |phase| phase.ring() == r)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Property: one update over a span equals one update per tenth
        #[test]
        fn batching_is_invisible(segments in segments()) {
            let mut batched = controller();
            let mut stepped = controller();
            let mut t = 0u32;
            for segment in &segments {
                batched.stage(segment.inputs);
                stepped.stage(segment.inputs);
                for tick in 1..=segment.ticks {
                    stepped.update(t + tick);
                }
                t += segment.ticks;
                batched.update(t);
                prop_assert_eq!(batched.snapshot(), stepped.snapshot());
            }
        }

        // Property: rings keep to their own phases and the lamps never conflict
        #[test]
        fn phases_stay_exclusive(segments in segments()) {
            let mut controller = controller();
            let mut t = 0u32;
            for segment in &segments {
                controller.stage(segment.inputs);
                for _ in 0..segment.ticks {
                    t += 1;
                    controller.update(t);
                    for r in 0..2 {
                        prop_assert!(phase_in_ring(controller.ring(r), r), "ring {} at t={}: {:?}", r, t, controller.ring(r));
                    }
                    prop_assert!(monitor::check(controller.output()).is_ok(), "conflict at t={}: {:?}", t, controller.output());
                }
            }
        }

        // Property: while a cross executes no ring is green, and nobody loads
        // a phase until both have reached red
        #[test]
        fn barrier_cross_is_mutually_exclusive(segments in segments()) {
            let mut controller = controller();
            let mut t = 0u32;
            for segment in &segments {
                controller.stage(segment.inputs);
                for _ in 0..segment.ticks {
                    t += 1;
                    controller.update(t);
                    if controller.barrier_cross_state() == BarrierCrossState::Executing {
                        for r in 0..2 {
                            prop_assert!(!controller.ring(r).interval.is_green(), "ring {} green during cross at t={}", r, t);
                        }
                    }
                }
            }
        }

        // Property: an expired, uninhibited max terminates within one tick
        // unless a hold or a ped interval keeps it
        #[test]
        fn max_is_enforced(segments in segments()) {
            let mut controller = controller();
            let mut t = 0u32;
            for segment in &segments {
                controller.stage(segment.inputs);
                for tick in 0..segment.ticks {
                    t += 1;
                    let before = *controller.ring(0);
                    controller.update(t);
                    if tick == 0 {
                        continue;
                    }

                    let inputs = controller.pending();
                    let pinned = before.phase.is_some_and(|p| inputs.hold.contains(p))
                        || before.ped_interval != PedInterval::Invalid
                        || inputs.rings.inhibit_max_termination.contains(0)
                        || inputs.rings.stop_timing.contains(0)
                        || inputs.inputs.contains(ControllerInputs::STOP_TIMING)
                        || inputs.inputs.contains(ControllerInputs::EXTERNAL_START);
                    if before.interval.is_max() && before.max_timer == 0 && !pinned {
                        let after = controller.ring(0);
                        prop_assert!(
                            !after.interval.is_max() || after.barrier_state == BarrierState::ClearanceReady,
                            "still timing max at t={}: {:?}", t, after
                        );
                    }
                }
            }
        }

        // Property: reduced passage never rises and never drops below MinGap
        #[test]
        fn gap_reduction_is_monotonic(
            passage in 1u16..200,
            min_gap_ratio in 0.0f64..=1.0,
            ttr in 1u16..300,
            before in 0u16..100,
            ticks in 1usize..600,
        ) {
            let min_gap = (f64::from(passage) * min_gap_ratio) as u16;
            let mut row = [0u16; TimingParam::COUNT];
            row[TimingParam::Passage.index()] = passage;
            row[TimingParam::MinGap.index()] = min_gap;
            row[TimingParam::TimeToReduce.index()] = ttr;
            row[TimingParam::BeforeReduction.index()] = before;
            let config = Configuration {
                timing: TimingTable::uniform(row),
                ..Configuration::default()
            };

            let mut ring = Ring {
                phase: Phase::new(4),
                interval: Interval::MaxI,
                reduced_passage: passage,
                before_reduction_timer: before,
                time_to_reduce_timer: ttr,
                ..Ring::default()
            };
            let mut last = ring.reduced_passage;
            for _ in 0..ticks {
                gap::reduce_passage(&mut ring, &config);
                prop_assert!(ring.reduced_passage <= last);
                prop_assert!(ring.reduced_passage >= min_gap);
                last = ring.reduced_passage;
            }
            if ticks >= usize::from(before) + usize::from(ttr) {
                prop_assert_eq!(ring.reduced_passage, min_gap);
            }
        }
    }
}
