use crate::value::Value;

/// Whether [`property_values`] flattens list-typed contributions into one
/// merged list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    MergeLists,
    NoMerge,
}

/// The value of `modules.<module_name>.<key>` in a resolved product map.
/// Looks at the top-level module map only; `Undefined` when the module or
/// key is absent. Pure function of the map.
pub fn property_value(map: &Value, module_name: &str, key: &str) -> Value {
    map["modules"][module_name][key].clone()
}

/// Every value the module contributed for `key` anywhere in the nested
/// module maps, direct hits first, in discovery order, with exact repeats
/// suppressed. With [`MergeType::MergeLists`], nested lists are flattened
/// into their elements.
pub fn property_values(map: &Value, module_name: &str, key: &str, merge: MergeType) -> Vec<Value> {
    let mut values = vec![];
    find_module_values(map, module_name, key, &mut values);
    if merge == MergeType::MergeLists {
        values = merge_lists(&values);
    }
    values
}

fn find_module_values(map: &Value, module_name: &str, key: &str, out: &mut Vec<Value>) {
    let modules = &map["modules"];
    let Ok(module_map) = modules.as_object() else {
        return;
    };

    // Direct hits come first.
    if let Some(m) = module_map.get(module_name) {
        add_to_list(out, m[key].clone());
    }
    for (name, sub) in module_map.iter() {
        if name == module_name {
            continue;
        }
        find_module_values(sub, module_name, key, out);
    }
}

fn add_to_list(out: &mut Vec<Value>, value: Value) {
    if !value.is_undefined() && !value.is_null() && !out.contains(&value) {
        out.push(value);
    }
}

fn merge_lists(values: &[Value]) -> Vec<Value> {
    let mut out = vec![];
    for v in values {
        match v {
            Value::List(items) => out.extend(merge_lists(items)),
            _ => out.push(v.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(json: &str) -> Value {
        Value::from_json_str(json).unwrap()
    }

    #[test]
    fn value_is_top_level_only() {
        let m = map(
            r#"{"modules":{"dummy":{"defines":["A"]},
                 "other":{"modules":{"dummy":{"defines":["B"]}}}}}"#,
        );
        assert_eq!(
            property_value(&m, "dummy", "defines"),
            Value::from_json_str(r#"["A"]"#).unwrap()
        );
        assert!(property_value(&m, "missing", "defines").is_undefined());
        assert!(property_value(&m, "dummy", "missing").is_undefined());
    }

    #[test]
    fn values_merge_in_contribution_order() {
        let m = map(
            r#"{"modules":{"dummy":{"defines":["ONE"]},
                 "other":{"modules":{"dummy":{"defines":["TWO"]}}}}}"#,
        );
        let values = property_values(&m, "dummy", "defines", MergeType::MergeLists);
        assert_eq!(values, vec![Value::from("ONE"), Value::from("TWO")]);
    }

    #[test]
    fn override_wins_over_profile() {
        // The overridden value is the only contribution left in the map.
        let m = map(r#"{"modules":{"dummy":{"cFlags":["OVERRIDDEN"]}}}"#);
        let values = property_values(&m, "dummy", "cFlags", MergeType::MergeLists);
        assert_eq!(values, vec![Value::from("OVERRIDDEN")]);
    }

    #[test]
    fn exact_repeats_are_suppressed() {
        let m = map(
            r#"{"modules":{"dummy":{"defines":["X"]},
                 "a":{"modules":{"dummy":{"defines":["X"]}}},
                 "b":{"modules":{"dummy":{"defines":["Y"]}}}}}"#,
        );
        let values = property_values(&m, "dummy", "defines", MergeType::MergeLists);
        assert_eq!(values, vec![Value::from("X"), Value::from("Y")]);
    }

    #[test]
    fn no_merge_returns_whole_contributions() {
        let m = map(r#"{"modules":{"dummy":{"defines":["A","B"]}}}"#);
        let values = property_values(&m, "dummy", "defines", MergeType::NoMerge);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], Value::from_json_str(r#"["A","B"]"#).unwrap());
    }

    #[test]
    fn scalar_contributions_pass_through_merge() {
        let m = map(r#"{"modules":{"dummy":{"cxxFlags":"IN_PROFILE"}}}"#);
        let values = property_values(&m, "dummy", "cxxFlags", MergeType::MergeLists);
        assert_eq!(values, vec![Value::from("IN_PROFILE")]);
    }
}
