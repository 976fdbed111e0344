//! Property tests for schedules, aggregation and profit

use gridtou_common::{
    AggregatedConsumption, ConsumerProfile, ConsumptionReport, CostModel, PriceBounds,
    PriceSchedule, ResponseModel, SatisfactionModel,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const SLOTS: usize = 4;

fn price_in_bounds() -> impl Strategy<Value = f32> {
    0.5f32..=1.5f32
}

fn schedule() -> impl Strategy<Value = PriceSchedule> {
    prop::collection::vec(price_in_bounds(), SLOTS)
        .prop_map(|prices| PriceSchedule::new(prices, &PriceBounds::default()).unwrap())
}

fn reports(max_reports: usize) -> impl Strategy<Value = Vec<ConsumptionReport>> {
    prop::collection::vec(prop::collection::vec(0i32..50, SLOTS), 1..max_reports).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(id, values)| ConsumptionReport::new(id as i32, values))
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn uniform_schedules_stay_in_bounds(seed in any::<u64>()) {
        let bounds = PriceBounds::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let schedule = PriceSchedule::uniform(SLOTS, &bounds, &mut rng);
        prop_assert!(schedule.prices().iter().all(|&p| bounds.contains(p)));
    }

    #[test]
    fn perturbation_touches_one_slot(
        base in schedule(),
        slot in 0..SLOTS,
        price in price_in_bounds(),
    ) {
        let next = base.with_slot(slot, price, &PriceBounds::default()).unwrap();
        for i in 0..SLOTS {
            if i == slot {
                prop_assert_eq!(next.prices()[i].to_bits(), price.to_bits());
            } else {
                prop_assert_eq!(next.prices()[i].to_bits(), base.prices()[i].to_bits());
            }
        }
    }

    #[test]
    fn aggregation_is_per_slot_sum(reports in reports(8)) {
        let aggregated = AggregatedConsumption::from_reports(&reports, SLOTS).unwrap();
        for slot in 0..SLOTS {
            let expected: u64 = reports.iter().map(|r| r.values[slot] as u64).sum();
            prop_assert_eq!(aggregated.values()[slot], expected);
        }
    }

    #[test]
    fn profit_is_deterministic(price in schedule(), reports in reports(4)) {
        let aggregated = AggregatedConsumption::from_reports(&reports, SLOTS).unwrap();
        let model = CostModel::default();
        let first = model.compute_profit(&price, &aggregated).unwrap();
        let second = model.compute_profit(&price, &aggregated).unwrap();
        prop_assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn responses_respect_max_draw(price in schedule()) {
        let model = SatisfactionModel::default();
        for profile in ConsumerProfile::reference_profiles() {
            let report = model.respond(&profile, &price);
            prop_assert!(report.validate(SLOTS).is_ok());
            prop_assert!(report.values.iter().all(|&v| v >= 0 && v <= profile.max_draw));
        }
    }
}
