//! Diffing of the original and mutated objects into a base64 JSON patch.

use crate::{
    typings::{Patch, Response},
    Error, Result,
};
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;

pub const PATCH_TYPE: &str = "JSONPatch";

/// Structural RFC 6902 diff. Object keys are compared in sorted order, so the
/// result is deterministic for a given pair.
///
/// The patch is applied to a copy of `original` before it is returned. When
/// `json_patch::diff` does not reproduce `mutated` (it mishandles a value
/// turning from an object into an array and back), the patch is recomputed
/// with replaces at every point where the value kinds differ.
pub fn diff(original: &Value, mutated: &Value) -> Result<json_patch::Patch> {
    let patch = json_patch::diff(original, mutated);
    if reproduces(original, mutated, &patch) {
        return Ok(patch);
    }
    tracing::warn!(
        operations = patch.0.len(),
        "JSON patch does not reproduce the mutated object, recomputing"
    );
    let mut ops = Vec::new();
    replace_diff("", original, mutated, &mut ops);
    let patch = json_patch::Patch(ops);
    if reproduces(original, mutated, &patch) {
        Ok(patch)
    } else {
        Err(Error::internal(
            "computed JSON patch does not reproduce the mutated object",
        ))
    }
}

fn reproduces(original: &Value, mutated: &Value, patch: &json_patch::Patch) -> bool {
    let mut doc = original.clone();
    json_patch::patch(&mut doc, patch).is_ok() && doc == *mutated
}

/// Recurses into objects and equally long arrays, replaces everything else.
fn replace_diff(path: &str, from: &Value, to: &Value, ops: &mut Vec<PatchOperation>) {
    if from == to {
        return;
    }
    match (from, to) {
        (Value::Object(from), Value::Object(to)) => {
            for (key, old) in from {
                let child = format!("{}/{}", path, escape(key));
                match to.get(key) {
                    Some(new) => replace_diff(&child, old, new, ops),
                    None => ops.push(PatchOperation::Remove(RemoveOperation { path: child })),
                }
            }
            for (key, new) in to {
                if !from.contains_key(key) {
                    ops.push(PatchOperation::Add(AddOperation {
                        path: format!("{}/{}", path, escape(key)),
                        value: new.clone(),
                    }));
                }
            }
        }
        (Value::Array(from), Value::Array(to)) if from.len() == to.len() => {
            for (i, (old, new)) in from.iter().zip(to).enumerate() {
                replace_diff(&format!("{}/{}", path, i), old, new, ops);
            }
        }
        _ => ops.push(PatchOperation::Replace(ReplaceOperation {
            path: path.to_string(),
            value: to.clone(),
        })),
    }
}

/// JSON pointer escaping (RFC 6901).
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Compact JSON array, base64 encoded as the admission API expects.
pub fn encode_patch(patch: &json_patch::Patch) -> Result<String> {
    let raw = serde_json::to_string(patch)?;
    Ok(base64::encode(raw))
}

pub fn decode_patch(encoded: &str) -> Result<json_patch::Patch> {
    let raw = base64::decode(encoded)
        .map_err(|e| Error::internal(format!("patch is not valid base64: {}", e)))?;
    serde_json::from_slice(&raw).map_err(Into::into)
}

/// Builds the allowing response for one request. `original` is the object as
/// received, `mutated` the copy returned by the mutator.
pub fn build_response(original: &Value, mutated: &Value, uid: &str) -> Result<Response> {
    let ops = diff(original, mutated)?;
    tracing::debug!(uid, operations = ops.0.len(), "computed JSON patch");
    let patch = encode_patch(&ops)?;
    Ok(Response {
        uid: uid.to_string(),
        allowed: true,
        status: None,
        patch: Some(Patch {
            patch_type: PATCH_TYPE.to_string(),
            patch,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(original: &Value, encoded: &str) -> Value {
        let mut doc = original.clone();
        json_patch::patch(&mut doc, &decode_patch(encoded).unwrap()).unwrap();
        doc
    }

    #[test]
    fn equal_objects_give_empty_patch() {
        let obj = json!({"metadata": {"name": "a"}, "spec": {"x": [1, 2]}});
        let resp = build_response(&obj, &obj.clone(), "uid-1").unwrap();
        assert!(resp.allowed);
        assert_eq!(resp.uid, "uid-1");
        let patch = resp.patch.unwrap();
        assert_eq!(patch.patch_type, "JSONPatch");
        assert_eq!(base64::decode(&patch.patch).unwrap(), b"[]");
    }

    #[test]
    fn operations_target_deepest_path() {
        let original = json!({"metadata": {"annotations": {"a": "1"}, "name": "x"}});
        let mutated = json!({"metadata": {"annotations": {"a": "1", "b": "2"}, "name": "x"}});
        let ops = diff(&original, &mutated).unwrap().0;
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            PatchOperation::Add(op) => {
                assert_eq!(op.path, "/metadata/annotations/b");
                assert_eq!(op.value, json!("2"));
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn diff_is_deterministic() {
        let original = json!({"b": 1, "a": {"c": true}, "d": "x"});
        let mutated = json!({"b": 2, "a": {"c": false, "e": null}, "z": "y"});
        let first = serde_json::to_string(&diff(&original, &mutated).unwrap()).unwrap();
        let second = serde_json::to_string(&diff(&original, &mutated).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn patch_round_trips() {
        let cases = vec![
            (json!({"a": 1}), json!({"a": 2})),
            (json!({"a": 1, "b": 2}), json!({"a": 1})),
            (json!({"a": {"b": {"c": 1}}}), json!({"a": {"b": {"c": 1, "d": [1, 2]}}})),
            (json!({"list": [1, 2]}), json!({"list": [1, 2, 3]})),
            (json!({"list": [1, 2]}), json!({"list": [1, 5]})),
            (json!({"x": null}), json!({"x": {"y": "z"}})),
            (json!({"spec": {}}), json!({"spec": {"tls": [{"hosts": ["h"], "secretName": "s"}]}})),
        ];
        for (original, mutated) in cases {
            let resp = build_response(&original, &mutated, "uid").unwrap();
            let encoded = resp.patch.unwrap().patch;
            assert_eq!(apply(&original, &encoded), mutated);
        }
    }

    #[test]
    fn garbage_patch_fails_to_decode() {
        assert!(matches!(decode_patch("%%%"), Err(Error::Internal(_))));
        let not_json = base64::encode("{");
        assert!(matches!(decode_patch(&not_json), Err(Error::Internal(_))));
    }

    #[test]
    fn kind_changes_are_replaced() {
        let cases = vec![
            (json!({"a": {"b": 1, "c": 2}}), json!({"a": [1]})),
            (json!({"a": [1, 2]}), json!({"a": {"0": 1}})),
            (json!({"x": [{"k": {"y": 1}}]}), json!({"x": [{"k": [1]}]})),
            (json!({"a": {"b": 1}}), json!({"a": "b"})),
        ];
        for (original, mutated) in cases {
            let resp = build_response(&original, &mutated, "uid").unwrap();
            let encoded = resp.patch.unwrap().patch;
            assert_eq!(apply(&original, &encoded), mutated);
        }
    }

    #[test]
    fn replace_diff_escapes_keys_and_keeps_deep_paths() {
        let original = json!({"a/b": {"m~n": {"k": 1}}, "keep": [1, 2]});
        let mutated = json!({"a/b": {"m~n": [1]}, "keep": [1, 3]});
        let mut ops = Vec::new();
        replace_diff("", &original, &mutated, &mut ops);
        let paths: Vec<String> = ops
            .iter()
            .map(|op| match op {
                PatchOperation::Replace(op) => op.path.clone(),
                other => panic!("unexpected operation {:?}", other),
            })
            .collect();
        assert_eq!(paths, vec!["/a~1b/m~0n", "/keep/1"]);
        assert!(reproduces(&original, &mutated, &json_patch::Patch(ops)));
    }
}
