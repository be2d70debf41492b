//! JSON Pointer (RFC 6901) parsing and evaluation.

use serde_json::Value;

use crate::error::Error;

/// Split a pointer (`#/a/b`, `/a/b`, `#` or empty) into unescaped tokens.
///
/// Tokens are percent-decoded, then `~1` becomes `/` and `~0` becomes `~`.
///
/// # Errors
///
/// Returns `Error::InvalidPointer` if a non-empty pointer does not start with `/`.
pub fn parse(pointer: &str, url: &str) -> Result<Vec<String>, Error> {
    let path = pointer.strip_prefix('#').unwrap_or(pointer);
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(path) = path.strip_prefix('/') else {
        return Err(Error::InvalidPointer {
            pointer: pointer.to_string(),
            url: url.to_string(),
        });
    };

    Ok(path
        .split('/')
        .map(|raw| {
            let decoded = urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            decoded.replace("~1", "/").replace("~0", "~")
        })
        .collect())
}

/// Escape one token for use in a pointer.
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Join tokens into a pointer (`/a/b`; empty for the whole document).
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| format!("/{}", escape(t.as_ref())))
        .collect()
}

/// Canonical form of a pointer: tokens decoded then re-escaped.
pub fn normalize(pointer: &str, url: &str) -> Result<String, Error> {
    Ok(join(&parse(pointer, url)?))
}

/// Step one token into `value`: object key or array index.
pub fn step<'a>(value: &'a Value, token: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(token),
        Value::Array(arr) => token.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

/// Evaluate `pointer` against `document`.
///
/// An empty pointer or `#` returns the whole document.
///
/// # Errors
///
/// Returns `Error::MissingPointer` naming the first token that does not
/// resolve, with `url` as the source document.
pub fn evaluate<'a>(document: &'a Value, pointer: &str, url: &str) -> Result<&'a Value, Error> {
    let mut current = document;
    for token in parse(pointer, url)? {
        current = step(current, &token).ok_or_else(|| Error::MissingPointer {
            token: token.clone(),
            pointer: pointer.to_string(),
            url: url.to_string(),
        })?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_document() {
        let doc = json!({"a": 1});
        assert_eq!(evaluate(&doc, "", "file:///a.json").unwrap(), &doc);
        assert_eq!(evaluate(&doc, "#", "file:///a.json").unwrap(), &doc);
    }

    #[test]
    fn walks_objects_and_arrays() {
        let doc = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(evaluate(&doc, "#/a/b/0", "u").unwrap(), &json!(10));
        assert_eq!(evaluate(&doc, "/a/b/1/c", "u").unwrap(), &json!(true));
    }

    #[test]
    fn escapes_and_percent_encoding() {
        let doc = json!({"a/b": {"m~n": 1}, "with space": 2});
        assert_eq!(evaluate(&doc, "#/a~1b/m~0n", "u").unwrap(), &json!(1));
        assert_eq!(evaluate(&doc, "#/with%20space", "u").unwrap(), &json!(2));
    }

    #[test]
    fn missing_segment_is_named() {
        let doc = json!({"a": 1});
        let err = evaluate(&doc, "#/does/not/exist", "file:///doc.json").unwrap_err();
        assert_eq!(
            err,
            Error::MissingPointer {
                token: "does".into(),
                pointer: "#/does/not/exist".into(),
                url: "file:///doc.json".into(),
            }
        );
    }

    #[test]
    fn out_of_range_index() {
        let doc = json!({"a": [1]});
        let err = evaluate(&doc, "#/a/1", "u").unwrap_err();
        assert!(matches!(err, Error::MissingPointer { token, .. } if token == "1"));
    }

    #[test]
    fn invalid_pointer() {
        let doc = json!({"a": 1});
        let err = evaluate(&doc, "#a", "u").unwrap_err();
        assert!(matches!(err, Error::InvalidPointer { .. }));
    }

    #[test]
    fn every_reachable_value_round_trips() {
        fn check(doc: &Value, node: &Value, tokens: &mut Vec<String>) {
            assert_eq!(evaluate(doc, &join(tokens), "u").unwrap(), node);
            match node {
                Value::Object(map) => {
                    for (k, v) in map {
                        tokens.push(k.clone());
                        check(doc, v, tokens);
                        tokens.pop();
                    }
                }
                Value::Array(arr) => {
                    for (i, v) in arr.iter().enumerate() {
                        tokens.push(i.to_string());
                        check(doc, v, tokens);
                        tokens.pop();
                    }
                }
                _ => {}
            }
        }

        let doc = json!({
            "paths": {"/pets/{id}": {"get": {"tags": ["a~b", "c"]}}},
            "": {"empty key": null}
        });
        check(&doc, &doc, &mut Vec::new());
    }

    #[test]
    fn normalize_re_escapes() {
        assert_eq!(normalize("#/a%2Fb/c", "u").unwrap(), "/a~1b/c");
        assert_eq!(normalize("#", "u").unwrap(), "");
    }
}
