//! Search view over a section. Pure and recomputed on demand.

use crate::types::EntityRecord;
use serde_json::Value;

/// Case-insensitive substring match of `query` against `fields`.
/// An empty or whitespace query matches everything.
pub fn filter<'a>(records: &'a [EntityRecord], fields: &[String], query: &str) -> Vec<&'a EntityRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }

    records
        .iter()
        .filter(|record| matches(record, fields, &needle))
        .collect()
}

fn matches(record: &EntityRecord, fields: &[String], needle: &str) -> bool {
    fields.iter().any(|field| match record.get(field) {
        Some(Value::String(s)) => s.to_lowercase().contains(needle),
        Some(Value::Number(n)) => n.to_string().contains(needle),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionSpec;
    use serde_json::json;

    #[test]
    fn test_filter() {
        let spec = SectionSpec::new("s");
        let records: Vec<EntityRecord> = [
            json!({"address": "0xAAA", "chain": "sol", "name": "Doge Killer", "symbol": "DK"}),
            json!({"address": "0xBBB", "chain": "sol", "name": "Pepe", "symbol": "PEPE"}),
        ]
        .into_iter()
        .map(|v| EntityRecord::from_value(&spec, v).unwrap())
        .collect();

        assert_eq!(filter(&records, &spec.search_fields, "").len(), 2);
        assert_eq!(filter(&records, &spec.search_fields, "  pepe ").len(), 1);
        assert_eq!(filter(&records, &spec.search_fields, "0xaaa").len(), 1);
        assert_eq!(filter(&records, &spec.search_fields, "sol").len(), 0);
    }
}
