//! Result payload shape handling.
//!
//! The scraping worker returns whatever its scraper produced: a bare array, an
//! object wrapping `results` or `items`, or the task envelope
//! `{"status": "success", "data": ...}`. These helpers find the item array and
//! the item count without caring which shape arrived.

use serde_json::{Map, Value};

/// Count the items in a result payload.
///
/// Tried in order, first match wins:
/// 1. the payload is an array
/// 2. `results` array
/// 3. `data.results` array
/// 4. `items` array
/// 5. `data` array
/// 6. numeric `resultCount` / `resultsCount`
/// 7. zero
pub fn count_results(payload: &Value) -> i64 {
    if let Some(items) = enrichable_items(payload) {
        return items.len() as i64;
    }

    ["resultCount", "resultsCount"]
        .iter()
        .filter_map(|key| payload.get(key))
        .find_map(explicit_count)
        .unwrap_or(0)
}

fn explicit_count(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|n| n.min(i64::MAX as u64) as i64))
        .or_else(|| value.as_f64().map(|n| n as i64))
        .map(|n| n.max(0))
}

/// The item array inside a payload, using the same precedence as
/// [`count_results`] steps 1-5.
pub fn enrichable_items(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = payload.as_array() {
        return Some(items);
    }
    payload
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| {
            payload
                .get("data")
                .and_then(|data| data.get("results"))
                .and_then(Value::as_array)
        })
        .or_else(|| payload.get("items").and_then(Value::as_array))
        .or_else(|| payload.get("data").and_then(Value::as_array))
}

fn items_mut(payload: &mut Value) -> Option<&mut Vec<Value>> {
    if payload.is_array() {
        return payload.as_array_mut();
    }

    let key = if payload.get("results").is_some_and(Value::is_array) {
        "results"
    } else if payload
        .get("data")
        .and_then(|data| data.get("results"))
        .is_some_and(Value::is_array)
    {
        return payload
            .get_mut("data")
            .and_then(|data| data.get_mut("results"))
            .and_then(Value::as_array_mut);
    } else if payload.get("items").is_some_and(Value::is_array) {
        "items"
    } else {
        "data"
    };

    payload.get_mut(key).and_then(Value::as_array_mut)
}

/// True for the worker's business-error envelope `{"status": "error", ...}`.
pub fn is_error_envelope(result: &Value) -> bool {
    result.get("status").and_then(Value::as_str) == Some("error")
}

/// Error message carried by an error envelope.
pub fn envelope_error(result: &Value) -> Option<String> {
    result.get("error").map(|error| match error {
        Value::String(message) => message.clone(),
        other => other.to_string(),
    })
}

/// Strip the `{"status": "success", "data": ...}` envelope if present.
pub fn canonical_output(result: Value) -> Value {
    let is_success_envelope = result.get("status").and_then(Value::as_str) == Some("success")
        && result.get("data").is_some();

    match result {
        Value::Object(mut map) if is_success_envelope => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// Identifier keys an enrichment record may be matched on.
pub const ITEM_ID_KEYS: [&str; 2] = ["placeId", "url"];

/// Whether a record carries at least one identifier usable for matching.
pub fn has_item_identifier(record: &Map<String, Value>) -> bool {
    ITEM_ID_KEYS
        .iter()
        .any(|key| record.get(*key).is_some_and(|v| !v.is_null()))
}

/// Shallow-merge `record` into the first output item sharing its `placeId`
/// or `url`. Returns `false` when nothing matched; `output` is untouched then.
pub fn merge_enriched_item(output: &mut Value, record: &Map<String, Value>) -> bool {
    let Some(items) = items_mut(output) else {
        return false;
    };

    let matches = |item: &Value| {
        ITEM_ID_KEYS.iter().any(|key| match record.get(*key) {
            Some(id) if !id.is_null() => item.get(*key) == Some(id),
            _ => false,
        })
    };

    let Some(entry) = items
        .iter_mut()
        .find(|item| matches(item))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };

    for (key, value) in record {
        entry.insert(key.clone(), value.clone());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_policy_table() {
        let cases = [
            (json!([{}, {}, {}]), 3),
            (json!({"results": [{}, {}]}), 2),
            (json!({"data": {"results": [{}]}}), 1),
            (json!({"items": [{}, {}, {}, {}]}), 4),
            (json!({"data": [{}, {}]}), 2),
            (json!({"resultCount": 7}), 7),
            (json!({"resultsCount": 5}), 5),
            (json!({}), 0),
            (json!("just text"), 0),
            (Value::Null, 0),
        ];

        for (payload, expected) in cases {
            assert_eq!(count_results(&payload), expected, "payload: {}", payload);
        }
    }

    #[test]
    fn test_count_prefers_arrays_over_explicit_count() {
        let payload = json!({"results": [{}], "resultCount": 99});
        assert_eq!(count_results(&payload), 1);
    }

    #[test]
    fn test_negative_explicit_count_is_zero() {
        assert_eq!(count_results(&json!({"resultCount": -5})), 0);
        assert_eq!(count_results(&json!({"resultsCount": -2.5})), 0);
    }

    #[test]
    fn test_results_wins_over_items() {
        let payload = json!({"items": [{}, {}, {}], "results": [{}]});
        assert_eq!(count_results(&payload), 1);
    }

    #[test]
    fn test_canonical_output_unwraps_success_envelope() {
        let result = json!({"status": "success", "data": [{"title": "A"}]});
        assert_eq!(canonical_output(result), json!([{"title": "A"}]));

        let bare = json!({"results": []});
        assert_eq!(canonical_output(bare.clone()), bare);
    }

    #[test]
    fn test_error_envelope() {
        let result = json!({"status": "error", "error": "Unknown actor: nope"});
        assert!(is_error_envelope(&result));
        assert_eq!(envelope_error(&result).as_deref(), Some("Unknown actor: nope"));
        assert!(!is_error_envelope(&json!({"status": "success", "data": []})));
    }

    #[test]
    fn test_merge_preserves_existing_fields() {
        let mut output = json!([
            {"placeId": "p0", "title": "Other"},
            {"placeId": "p1", "title": "X"}
        ]);
        let record = json!({"placeId": "p1", "enrichedEmails": ["a@b.com"]});

        assert!(merge_enriched_item(
            &mut output,
            record.as_object().unwrap()
        ));
        assert_eq!(output[1]["title"], "X");
        assert_eq!(output[1]["enrichedEmails"], json!(["a@b.com"]));
        assert_eq!(output[0], json!({"placeId": "p0", "title": "Other"}));
    }

    #[test]
    fn test_merge_by_url_inside_results() {
        let mut output = json!({"results": [{"url": "https://maps/a", "title": "A"}]});
        let record = json!({"url": "https://maps/a", "phone": "555", "title": "A2"});

        assert!(merge_enriched_item(
            &mut output,
            record.as_object().unwrap()
        ));
        assert_eq!(output["results"][0]["phone"], "555");
        assert_eq!(output["results"][0]["title"], "A2");
    }

    #[test]
    fn test_merge_without_match_leaves_output_unchanged() {
        let mut output = json!([{"placeId": "p1", "title": "X"}]);
        let before = output.clone();
        let record = json!({"placeId": "nope", "enrichedEmails": []});

        assert!(!merge_enriched_item(
            &mut output,
            record.as_object().unwrap()
        ));
        assert_eq!(output, before);
    }

    #[test]
    fn test_has_item_identifier() {
        assert!(has_item_identifier(json!({"url": "x"}).as_object().unwrap()));
        assert!(!has_item_identifier(json!({"placeId": null}).as_object().unwrap()));
        assert!(!has_item_identifier(json!({"email": "a"}).as_object().unwrap()));
    }
}
