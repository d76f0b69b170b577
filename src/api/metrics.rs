//! Gauge extraction from a Prometheus text exposition
//!
//! The console only needs a handful of named gauges out of `/metrics`, so
//! instead of a full exposition parser there is one line pattern: metric
//! name, an optional `{label="…"}` set, and a value that may use scientific
//! notation or the `+Inf`/`-Inf`/`NaN` specials.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref METRIC_LINE: Regex = Regex::new(
        r"^\s*([a-zA-Z_:][a-zA-Z0-9_:]*)(?:\{[^}]*\})?\s+([+-]?(?:[0-9]*\.?[0-9]+(?:[eE][+-]?[0-9]+)?|Inf|NaN))\s*$"
    )
    .unwrap();
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "Inf" | "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" | "+NaN" | "-NaN" => Some(f64::NAN),
        _ => raw.parse().ok(),
    }
}

/// Extract the first sample of the named metric, label set or not.
pub fn extract_gauge(text: &str, name: &str) -> Option<f64> {
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        if let Some(caps) = METRIC_LINE.captures(line) {
            if &caps[1] == name {
                return parse_value(&caps[2]);
            }
        }
    }
    None
}

/// Extract several gauges in one pass over the exposition. Names without a
/// matching sample are reported as `None` so callers can render a
/// placeholder.
pub fn extract_gauges(text: &str, names: &[String]) -> BTreeMap<String, Option<f64>> {
    let mut out: BTreeMap<String, Option<f64>> =
        names.iter().map(|n| (n.clone(), None)).collect();

    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let Some(caps) = METRIC_LINE.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        if let Some(slot) = out.get_mut(&name) {
            if slot.is_none() {
                *slot = parse_value(&caps[2]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = "\
# HELP ingestion_lag_seconds Lag behind the exchange feed
# TYPE ingestion_lag_seconds gauge
ingestion_lag_seconds 4.25
candles_ingested_total{symbol=\"BTCUSDT\",interval=\"1m\"} 1.234568e+06
model_train_duration_seconds 3.2e2
queue_depth 0
weird_metric +Inf
";

    #[test]
    fn test_plain_gauge() {
        assert_eq!(extract_gauge(EXPOSITION, "ingestion_lag_seconds"), Some(4.25));
    }

    #[test]
    fn test_labeled_gauge() {
        let value = extract_gauge(EXPOSITION, "candles_ingested_total").unwrap();
        assert!((value - 1_234_568.0).abs() < 1.0);
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(
            extract_gauge(EXPOSITION, "model_train_duration_seconds"),
            Some(320.0)
        );
    }

    #[test]
    fn test_name_anchoring() {
        // "lag_seconds" must not match inside "ingestion_lag_seconds"
        assert_eq!(extract_gauge(EXPOSITION, "lag_seconds"), None);
        assert_eq!(extract_gauge(EXPOSITION, "ingestion_lag"), None);
    }

    #[test]
    fn test_infinity_special() {
        assert_eq!(
            extract_gauge(EXPOSITION, "weird_metric"),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn test_absent_metric() {
        assert_eq!(extract_gauge(EXPOSITION, "not_there"), None);
    }

    #[test]
    fn test_comment_lines_skipped() {
        // The HELP line mentions the metric name; it must not be parsed
        assert_eq!(extract_gauge("# ingestion_lag_seconds 99\n", "ingestion_lag_seconds"), None);
    }

    #[test]
    fn test_extract_many() {
        let names = vec![
            "ingestion_lag_seconds".to_string(),
            "queue_depth".to_string(),
            "missing".to_string(),
        ];
        let gauges = extract_gauges(EXPOSITION, &names);
        assert_eq!(gauges["ingestion_lag_seconds"], Some(4.25));
        assert_eq!(gauges["queue_depth"], Some(0.0));
        assert_eq!(gauges["missing"], None);
    }
}
