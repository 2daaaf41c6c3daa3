//! Condition assigners fed from a wide site frame

use approx::assert_relative_eq;
use phab_metrics::condition::{
    assign_bed_stability, assign_drawdown_exposure, assign_littoral_cover, assign_riparian_disturbance,
    records_to_wide, BedStabilityConfig, ConditionClass, DrawdownExposureConfig, LittoralCoverConfig,
    RiparianDisturbanceConfig,
};
use phab_metrics::{wide_from_frame, Key, WideTable};
use polars::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log to the test output; `RUST_LOG` overrides the default level
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phab_metrics=debug,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn sites() -> WideTable {
    init_logging();
    let df = df![
        "SITE_ID" => ["NLA-001", "NLA-002", "NLA-003"],
        "ECO9" => [Some("WMT"), Some("CPL"), None],
        "LAKE_ORIGIN" => [Some("NATURAL"), Some("MAN_MADE"), Some("NATURAL")],
        "ELEVATION" => [Some(1000.0), Some(10.0), None],
        "HIFPANYCIRCA_SYN" => [Some(0.05), Some(0.9), Some(0.4)],
        "FCIALL_LIT" => [Some(0.6), Some(0.1), None],
        "BSXLDIA" => [Some(1.2), Some(-2.0), Some(0.0)],
        "BFXHORIZDIST_DD" => [Some(3.0), Some(55.0), None],
        "BFXVERTHEIGHT_DD" => [Some(0.2), Some(0.3), Some(0.1)],
    ]
    .unwrap();
    wide_from_frame(&df, "SITE_ID").unwrap()
}

#[test]
fn riparian_disturbance_classes() {
    let out = assign_riparian_disturbance(&sites(), &RiparianDisturbanceConfig::default());
    let classes: Vec<ConditionClass> = out.iter().map(|r| r.condition).collect();
    assert_eq!(
        classes,
        vec![ConditionClass::Good, ConditionClass::Poor, ConditionClass::Fair]
    );
}

#[test]
fn littoral_cover_observed_over_expected() {
    let config = LittoralCoverConfig::from_json(
        r#"{"expected": {"rows": [
                {"ecoregion": "WMT", "expected": 0.5},
                {"ecoregion": "CPL", "origin": "ManMade", "expected": 0.4}
           ]}}"#,
    )
    .unwrap();
    let out = assign_littoral_cover(&sites(), &config);

    assert_relative_eq!(out[0].ratio.unwrap(), 1.2);
    assert_eq!(out[0].condition, ConditionClass::Good);
    assert_relative_eq!(out[1].ratio.unwrap(), 0.25);
    assert_eq!(out[1].condition, ConditionClass::Poor);
    // no ecoregion, no matching row, no observation
    assert_eq!(out[2].condition, ConditionClass::NotAssessed);
    assert_eq!(out[2].observed, None);
    assert_eq!(out[2].expected, None);
}

#[test]
fn drawdown_exposure_missing_axis_not_assessed() {
    let out = assign_drawdown_exposure(&sites(), &DrawdownExposureConfig::default());
    assert_eq!(out[0].condition, ConditionClass::Good);
    assert_eq!(out[1].horizontal_condition, ConditionClass::Poor);
    assert_eq!(out[1].condition, ConditionClass::Poor);
    assert_eq!(out[2].vertical_condition, ConditionClass::Good);
    assert_eq!(out[2].condition, ConditionClass::NotAssessed);
}

#[test]
fn bed_stability_residuals() {
    let config = BedStabilityConfig::from_json(
        r#"{"model": {"intercept": -1.0, "terms": [
                {"covariate": "elevation", "transform": "log10", "coef": 1.0}
           ]}}"#,
    )
    .unwrap();
    let out = assign_bed_stability(&sites(), &config);

    // expected = -1 + log10(1000) = 2
    assert_relative_eq!(out[0].expected.unwrap(), 2.0, epsilon = 1e-12);
    assert_relative_eq!(out[0].ratio.unwrap(), -0.8, epsilon = 1e-12);
    assert_eq!(out[0].condition, ConditionClass::Fair);
    // expected 0, residual -2
    assert_eq!(out[1].condition, ConditionClass::Poor);
    // missing elevation
    assert_eq!(out[2].condition, ConditionClass::NotAssessed);
    assert_eq!(out[2].observed, Some(0.0));
}

#[test]
fn condition_output_as_wide_table() {
    let out = assign_riparian_disturbance(&sites(), &RiparianDisturbanceConfig::default());
    let wide = records_to_wide(&out, "RDIS");
    let site = Key::from("NLA-002");
    assert_eq!(wide.num(&site, "RDIS_OBS"), Some(0.9));
    assert_eq!(wide.text(&site, "RDIS_COND"), Some("Poor".to_string()));

    let mut table = sites();
    table.merge(wide);
    assert_eq!(table.text(&site, "ECO9"), Some("CPL".to_string()));
    assert_eq!(table.text(&site, "RDIS_COND"), Some("Poor".to_string()));
}
