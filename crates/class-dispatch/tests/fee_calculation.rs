use std::io::Cursor;
use std::sync::Arc;

use class_dispatch::workflows::dispatch::fees::{
    ClampOutcome, DistanceBand, FeeCalculator, FeeInput, TransportFee,
};
use class_dispatch::workflows::dispatch::{
    CsvRuleSource, GradeKey, InstructorType, RuleConfig, RuleConfigError, RuleSourceError,
};

const SETTINGS: &str = "key,value
sessionFees.2,80000
sessionFees.4,150000
transport_0_20,0
transport_20_40,15000
transport_40_60,25000
transport_60_80,35000
transport_80_plus,50000
grades.internal_level2.minClasses,50
grades.internal_level2.minRating,4.0
grades.internal_level2.feeMultiplier,1.1
grades.internal_level2.priority,2
specialAllowances.weekend,20000
specialAllowances.holiday,30000
specialAllowances.emergency,15000
specialAllowances.multipleClasses,10000
taxWithholdingRate,0.033
minSessionFee,70000
maxSessionFee,150000
";

fn rules_from(csv: &str) -> Result<RuleConfig, RuleSourceError> {
    let entries = CsvRuleSource::parse(Cursor::new(csv))?;
    Ok(RuleConfig::from_entries(&entries)?)
}

fn level2(distance_km: f64) -> FeeInput {
    FeeInput {
        distance_km: Some(distance_km),
        ..FeeInput::new(2, InstructorType::Internal, GradeKey::InternalLevel2)
    }
}

#[test]
fn settings_export_prices_a_two_session_class() {
    let calculator = FeeCalculator::new(Arc::new(rules_from(SETTINGS).expect("rules load")));

    let breakdown = calculator.compute(&level2(35.0)).expect("fee computes");

    assert_eq!(breakdown.subtotal, 103_000);
    assert_eq!(breakdown.clamp, ClampOutcome::Unchanged);
    assert_eq!(breakdown.tax_withholding, 3_399);
    assert_eq!(breakdown.net_amount, 99_601);
}

#[test]
fn raised_minimum_applies_before_withholding() {
    let csv = SETTINGS.replace("minSessionFee,70000", "minSessionFee,110000");
    let calculator = FeeCalculator::new(Arc::new(rules_from(&csv).expect("rules load")));

    let breakdown = calculator.compute(&level2(35.0)).expect("fee computes");

    assert_eq!(breakdown.subtotal, 110_000);
    assert_eq!(breakdown.tax_withholding, 3_630);
    assert_eq!(breakdown.net_amount, 106_370);
}

#[test]
fn band_edges_belong_to_the_lower_band() {
    let calculator = FeeCalculator::new(Arc::new(rules_from(SETTINGS).expect("rules load")));

    let fees: Vec<(f64, u64)> = [0.0, 20.0, 20.1, 40.0, 60.0, 80.0, 80.5]
        .into_iter()
        .map(|km| {
            let breakdown = calculator.compute(&level2(km)).expect("fee computes");
            (km, breakdown.transport_fee())
        })
        .collect();

    assert_eq!(
        fees,
        vec![
            (0.0, 0),
            (20.0, 0),
            (20.1, 15_000),
            (40.0, 15_000),
            (60.0, 25_000),
            (80.0, 35_000),
            (80.5, 50_000),
        ]
    );
    assert_eq!(DistanceBand::for_distance(80.0), DistanceBand::UpTo80);
}

#[test]
fn transport_fee_never_decreases_with_distance() {
    let calculator = FeeCalculator::new(Arc::new(rules_from(SETTINGS).expect("rules load")));

    let mut previous = 0;
    for km in (0..=120).map(f64::from) {
        let breakdown = calculator.compute(&level2(km)).expect("fee computes");
        assert!(matches!(breakdown.transport, TransportFee::Distance { .. }));
        assert!(breakdown.transport_fee() >= previous);
        previous = breakdown.transport_fee();
    }
}

#[test]
fn missing_bound_fails_fast() {
    let csv = SETTINGS.replace("maxSessionFee,150000\n", "");

    match rules_from(&csv) {
        Err(RuleSourceError::Config(RuleConfigError::MissingKey(key))) => {
            assert_eq!(key, "maxSessionFee")
        }
        other => panic!("expected missing key, got {other:?}"),
    }
}

#[test]
fn multiplier_outside_range_is_rejected() {
    let csv = SETTINGS.replace(
        "grades.internal_level2.feeMultiplier,1.1",
        "grades.internal_level2.feeMultiplier,4.0",
    );

    assert!(matches!(
        rules_from(&csv),
        Err(RuleSourceError::Config(RuleConfigError::OutOfRange { .. }))
    ));
}
