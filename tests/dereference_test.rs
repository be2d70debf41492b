//! Dereference and resolve tests against on-disk schema sets.

use schema_refs::{dereference, parse, resolve, Circular, Error, Node, Options};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn path_str(path: &PathBuf) -> &str {
    path.to_str().unwrap()
}

/// An OpenAPI-ish set: root JSON, a YAML file in a subdirectory that refers
/// back up with `../`, and a shared definitions file.
fn petstore(dir: &TempDir) -> PathBuf {
    write(
        dir,
        "common/defs.json",
        r#"{"definitions": {"id": {"type": "integer", "format": "int64"}}}"#,
    );
    write(
        dir,
        "models/pet.yaml",
        "type: object\n\
         properties:\n  \
           id:\n    $ref: '../common/defs.json#/definitions/id'\n  \
           owner:\n    $ref: 'owner.yaml'\n",
    );
    write(
        dir,
        "models/owner.yaml",
        "type: object\n\
         properties:\n  \
           id:\n    $ref: '../common/defs.json#/definitions/id'\n  \
           pets:\n    type: array\n    items:\n      $ref: 'pet.yaml'\n",
    );
    write(
        dir,
        "api.json",
        r##"{
            "paths": {
                "/pets": {"get": {"responses": {"200": {"schema": {"$ref": "models/pet.yaml"}}}}}
            },
            "definitions": {
                "Pet": {"$ref": "models/pet.yaml"},
                "Owner": {"$ref": "./models/owner.yaml"}
            }
        }"##,
    )
}

#[test]
fn parse_reads_root_only() {
    let dir = TempDir::new().unwrap();
    let api = petstore(&dir);

    let value = parse(path_str(&api), &Options::default()).unwrap();
    assert_eq!(value["definitions"]["Pet"], json!({"$ref": "models/pet.yaml"}));
}

#[test]
fn resolve_loads_every_file_once() {
    let dir = TempDir::new().unwrap();
    let api = petstore(&dir);

    let refs = resolve(path_str(&api), &Options::default()).unwrap();
    let paths = refs.paths();
    assert_eq!(paths.len(), 4, "{paths:?}");
    assert!(paths[0].ends_with("/api.json"));
    assert!(paths.iter().any(|p| p.ends_with("/models/owner.yaml")));

    assert_eq!(
        refs.lookup("common/defs.json#/definitions/id/type").unwrap(),
        json!("integer")
    );
    assert!(refs.exists("models/pet.yaml#/properties/owner"));
    assert!(!refs.exists("models/pet.yaml#/properties/nope"));
}

#[test]
fn resolve_without_external_loads_root_only() {
    let dir = TempDir::new().unwrap();
    let api = petstore(&dir);

    let refs = resolve(path_str(&api), &Options::default().external(false)).unwrap();
    assert_eq!(refs.paths().len(), 1);
}

#[test]
fn cross_file_cycle_shares_identity() {
    let dir = TempDir::new().unwrap();
    let api = petstore(&dir);

    let result = dereference(path_str(&api), &Options::default()).unwrap();
    assert!(result.circular);
    assert!(result.graph.is_cyclic(result.root));

    // Every ref to pet.yaml lands on the same node
    let pet = result.get("#/definitions/Pet").unwrap();
    assert_eq!(
        result.get("#/paths/~1pets/get/responses/200/schema"),
        Some(pet)
    );
    assert_eq!(result.get("#/definitions/Owner/properties/pets/items"), Some(pet));
    assert_eq!(
        result.get("#/definitions/Pet/properties/owner"),
        result.get("#/definitions/Owner")
    );
    assert_eq!(
        result.get("#/definitions/Pet/properties/owner/properties/pets/items"),
        Some(pet)
    );

    let id = result.get("#/definitions/Pet/properties/id").unwrap();
    assert_eq!(
        result.graph.node(result.graph.get_key(id, "type").unwrap()),
        &Node::String("integer".into())
    );

    assert_eq!(result.files.len(), 4);
    let defs_count = result
        .refs
        .iter()
        .find(|(url, _)| url.ends_with("/common/defs.json"))
        .map(|(_, n)| *n);
    assert_eq!(defs_count, Some(2));
}

#[test]
fn cross_file_cycle_forbidden() {
    let dir = TempDir::new().unwrap();
    let api = petstore(&dir);

    let err = dereference(
        path_str(&api),
        &Options::default().circular(Circular::Forbid),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Circular { .. }), "{err}");
}

#[test]
fn acyclic_output_renders_fully() {
    let dir = TempDir::new().unwrap();
    write(&dir, "name.json", r#"{"type": "string", "minLength": 1}"#);
    let root = write(
        &dir,
        "root.json",
        r##"{
            "properties": {
                "first": {"$ref": "name.json"},
                "last": {"$ref": "name.json", "description": "family name"}
            }
        }"##,
    );

    let result = dereference(path_str(&root), &Options::default()).unwrap();
    assert!(!result.circular);
    assert_eq!(
        result.to_value(),
        json!({
            "properties": {
                "first": {"type": "string", "minLength": 1},
                "last": {"description": "family name", "type": "string", "minLength": 1}
            }
        })
    );
}

#[test]
fn text_and_binary_refs() {
    let dir = TempDir::new().unwrap();
    write(&dir, "README.md", "# Pets\n");
    fs::write(dir.path().join("logo.png"), [0x89u8, b'P', b'N', b'G']).unwrap();
    let root = write(
        &dir,
        "root.json",
        r#"{"description": {"$ref": "README.md"}, "logo": {"$ref": "logo.png"}}"#,
    );

    let value = dereference(path_str(&root), &Options::default())
        .unwrap()
        .to_value();
    assert_eq!(value["description"], json!("# Pets\n"));
    assert_eq!(value["logo"], json!([0x89, 0x50, 0x4e, 0x47]));
}

#[test]
fn missing_file_is_resolver_error() {
    let dir = TempDir::new().unwrap();
    let root = write(&dir, "root.json", r#"{"a": {"$ref": "nope.json"}}"#);

    let err = dereference(path_str(&root), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Resolver { .. }), "{err}");
    assert_eq!(err.exit_code(), 3);
    assert!(err.url().unwrap_or_default().ends_with("/nope.json"));
}

#[test]
fn unparseable_external_file_is_parser_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, "broken.json", "{ \"a\": [1, 2 ");
    let root = write(&dir, "root.json", r#"{"a": {"$ref": "broken.json"}}"#);

    let err = dereference(path_str(&root), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Parser { .. }), "{err}");
    assert!(err.to_string().starts_with("Error parsing"));
}

#[test]
fn relative_path_from_cwd() {
    // Paths without a scheme resolve against the current directory
    let cwd = std::env::current_dir().unwrap();
    let dir = TempDir::new_in(&cwd).unwrap();
    write(&dir, "a.json", r#"{"x": {"$ref": "b.json"}}"#);
    write(&dir, "b.json", r#"{"type": "boolean"}"#);

    let name = dir.path().file_name().unwrap().to_str().unwrap();
    let value: Value = dereference(&format!("{name}/a.json"), &Options::default())
        .unwrap()
        .to_value();
    assert_eq!(value, json!({"x": {"type": "boolean"}}));
}
