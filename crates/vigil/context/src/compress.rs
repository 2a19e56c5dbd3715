//! Compression rules applied before items enter a packet

use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Knobs for the compression rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLimits {
    /// Collections larger than this are summarized
    pub cardinality_threshold: usize,
    /// Exceptions listed verbatim in a summary
    pub max_exceptions: usize,
    /// Point budget for time series
    pub timeseries_points: usize,
}

impl Default for CompressionLimits {
    fn default() -> Self {
        Self {
            cardinality_threshold: 20,
            max_exceptions: 10,
            timeseries_points: 60,
        }
    }
}

fn status_of(item: &Value) -> String {
    ["status", "phase", "state"]
        .iter()
        .find_map(|k| match item.get(*k) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(o)) => o.get("phase").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Homogeneous collection above the threshold -> counts plus exceptions.
///
/// Items sharing the majority status are counted; the rest are listed.
pub fn summarize_collection(items: Vec<Value>, limits: &CompressionLimits) -> Value {
    if items.len() <= limits.cardinality_threshold {
        return Value::Array(items);
    }

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for item in &items {
        *by_status.entry(status_of(item)).or_default() += 1;
    }
    // Ties go to the alphabetically first status so output is stable.
    let majority = by_status
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(s, _)| s.clone())
        .unwrap_or_default();

    let total = items.len();
    let exceptions: Vec<Value> = items
        .into_iter()
        .filter(|item| status_of(item) != majority)
        .collect();
    let exception_count = exceptions.len();
    let listed: Vec<Value> = exceptions.into_iter().take(limits.max_exceptions).collect();

    json!({
        "summary": format!(
            "{total} items: {} {majority}, {exception_count} exceptions",
            total - exception_count
        ),
        "count": total,
        "by_status": by_status,
        "exceptions": listed,
        "omitted_exceptions": exception_count.saturating_sub(limits.max_exceptions),
    })
}

fn is_anomalous(event: &Value) -> bool {
    let level = event
        .get("type")
        .or_else(|| event.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or("normal");
    matches!(
        level.to_ascii_lowercase().as_str(),
        "warning" | "error" | "critical"
    )
}

/// Event log -> "N routine events, M anomalous events" with the anomalies listed
pub fn summarize_events(events: Vec<Value>, limits: &CompressionLimits) -> Value {
    let (anomalous, routine): (Vec<Value>, Vec<Value>) =
        events.into_iter().partition(is_anomalous);
    let anomalous_count = anomalous.len();
    json!({
        "summary": format!(
            "{} routine events, {} anomalous events",
            routine.len(),
            anomalous_count
        ),
        "routine": routine.len(),
        "anomalous": anomalous.into_iter().take(limits.max_exceptions).collect::<Vec<_>>(),
        "omitted_anomalous": anomalous_count.saturating_sub(limits.max_exceptions),
    })
}

/// Bucket-mean downsampling to at most `budget` points.
///
/// Each bucket keeps its first timestamp and the mean value; the last raw
/// point is preserved so the most recent reading is never averaged away.
pub fn downsample(points: &[(i64, f64)], budget: usize) -> Vec<(i64, f64)> {
    if budget == 0 {
        return Vec::new();
    }
    if points.len() <= budget {
        return points.to_vec();
    }
    if budget == 1 {
        return points.last().copied().into_iter().collect();
    }

    let head = &points[..points.len() - 1];
    let buckets = budget - 1;
    let mut out = Vec::with_capacity(budget);
    for b in 0..buckets {
        let start = b * head.len() / buckets;
        let end = ((b + 1) * head.len() / buckets).max(start + 1).min(head.len());
        let slice = &head[start..end];
        let mean = slice.iter().map(|(_, v)| v).sum::<f64>() / slice.len() as f64;
        out.push((slice[0].0, mean));
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_collection_untouched() {
        let items = vec![json!({"status": "Running"}); 3];
        assert_eq!(
            summarize_collection(items.clone(), &CompressionLimits::default()),
            Value::Array(items)
        );
    }

    #[test]
    fn test_large_collection_summarized_with_exceptions() {
        let mut items = vec![json!({"name": "p", "status": "Running"}); 40];
        items.push(json!({"name": "bad-1", "status": "CrashLoopBackOff"}));
        items.push(json!({"name": "bad-2", "status": "Pending"}));
        let out = summarize_collection(items, &CompressionLimits::default());
        assert_eq!(out["count"], 42);
        assert_eq!(out["exceptions"].as_array().unwrap().len(), 2);
        assert_eq!(out["by_status"]["Running"], 40);
        assert!(out["summary"].as_str().unwrap().starts_with("42 items: 40 Running"));
    }

    #[test]
    fn test_exception_list_is_capped() {
        let limits = CompressionLimits {
            cardinality_threshold: 2,
            max_exceptions: 1,
            timeseries_points: 10,
        };
        let items = vec![
            json!({"status": "Running"}),
            json!({"status": "Running"}),
            json!({"status": "Running"}),
            json!({"status": "Failed"}),
            json!({"status": "Failed"}),
        ];
        let out = summarize_collection(items, &limits);
        assert_eq!(out["exceptions"].as_array().unwrap().len(), 1);
        assert_eq!(out["omitted_exceptions"], 1);
    }

    #[test]
    fn test_event_summary() {
        let events = vec![
            json!({"type": "Normal", "reason": "Scheduled"}),
            json!({"type": "Normal", "reason": "Pulled"}),
            json!({"type": "Warning", "reason": "OOMKilled"}),
        ];
        let out = summarize_events(events, &CompressionLimits::default());
        assert_eq!(out["summary"], "2 routine events, 1 anomalous events");
        assert_eq!(out["anomalous"][0]["reason"], "OOMKilled");
    }

    #[test]
    fn test_downsample_respects_budget_and_keeps_last() {
        let points: Vec<(i64, f64)> = (0..1000).map(|i| (i, i as f64)).collect();
        let out = downsample(&points, 60);
        assert_eq!(out.len(), 60);
        assert_eq!(out.last(), Some(&(999, 999.0)));
        assert_eq!(out[0].0, 0);
        assert!(out.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_downsample_short_series_untouched() {
        let points = vec![(1, 1.0), (2, 2.0)];
        assert_eq!(downsample(&points, 60), points);
    }
}
