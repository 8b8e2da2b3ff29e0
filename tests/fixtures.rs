use serde_json_bytes::{Map, Value};

pub fn obj(pairs: &[(&str, Value)]) -> Map {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(*k, v.clone());
    }
    map
}

pub fn value_obj(pairs: &[(&str, Value)]) -> Value {
    Value::Object(obj(pairs))
}
