use super::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn store(tmp: &TempDir) -> SecretStore {
    SecretStore::new(
        tmp.path().join("secrets.json.enc"),
        tmp.path().join("secrets.key"),
    )
}

#[test]
fn set_then_get_roundtrips() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    store.set("API_KEY", "sk-abc-123").unwrap();
    assert_eq!(store.get("API_KEY").unwrap().as_deref(), Some("sk-abc-123"));
}

#[test]
fn new_instance_over_same_files_reads_same_value() {
    let tmp = TempDir::new().unwrap();
    {
        let store = store(&tmp);
        store.set("TOKEN", "value-1").unwrap();
    }
    let reopened = store(&tmp);
    assert_eq!(reopened.get("TOKEN").unwrap().as_deref(), Some("value-1"));
}

#[test]
fn missing_key_is_absent_not_cached_as_error() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    assert_eq!(store.get("NOPE").unwrap(), None);
    assert!(!store.exists("NOPE").unwrap());
}

#[test]
fn delete_removes_key() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    store.set("TO_DELETE", "x").unwrap();
    assert!(store.delete("TO_DELETE").unwrap());
    assert!(!store.delete("TO_DELETE").unwrap());
    assert_eq!(store.get("TO_DELETE").unwrap(), None);
}

#[test]
fn keys_are_sorted() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    store.set("ZEBRA", "1").unwrap();
    store.set("ALPHA", "2").unwrap();
    assert_eq!(store.keys().unwrap(), vec!["ALPHA".to_string(), "ZEBRA".to_string()]);
}

#[test]
fn tamper_byte_flip_is_detected() {
    let tmp = TempDir::new().unwrap();
    let secrets_path = tmp.path().join("secrets.json.enc");
    let store = SecretStore::new(secrets_path.clone(), tmp.path().join("secrets.key"));
    store.set("K", "v").unwrap();

    let mut raw = std::fs::read_to_string(&secrets_path).unwrap();
    // flip one character in the base64 body (not a trailing pad char).
    let mid = raw.len() / 2;
    let bytes = unsafe { raw.as_bytes_mut() };
    bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
    std::fs::write(&secrets_path, raw).unwrap();

    let fresh = SecretStore::new(secrets_path, tmp.path().join("secrets.key"));
    let err = fresh.get("K").unwrap_err();
    assert_eq!(err.kind(), "security");
}

#[test]
fn different_key_file_fails_decryption() {
    let tmp = TempDir::new().unwrap();
    let secrets_path = tmp.path().join("secrets.json.enc");
    let key_path = tmp.path().join("secrets.key");
    let store = SecretStore::new(secrets_path.clone(), key_path.clone());
    store.set("K", "v").unwrap();

    // Replace the key file with a freshly generated, unrelated key.
    std::fs::remove_file(&key_path).unwrap();
    let other_key_path = tmp.path().join("other.key");
    let other = SecretStore::new(tmp.path().join("other.enc"), other_key_path.clone());
    other.set("unrelated", "value").unwrap();
    std::fs::copy(&other_key_path, &key_path).unwrap();

    let fresh = SecretStore::new(secrets_path, key_path);
    let err = fresh.get("K").unwrap_err();
    assert_eq!(err.kind(), "security");
}

#[cfg(unix)]
#[test]
fn files_are_created_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    store.set("K", "v").unwrap();

    let secrets_mode = std::fs::metadata(tmp.path().join("secrets.json.enc"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    let key_mode = std::fs::metadata(tmp.path().join("secrets.key"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(secrets_mode, 0o600);
    assert_eq!(key_mode, 0o600);
}

#[test]
fn import_from_env_counts_and_strips_prefix() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    unsafe {
        std::env::set_var("SECRET_FOO", "foo-value");
        std::env::set_var("SECRET_BAR", "bar-value");
    }
    let count = store.import_from_env("SECRET_").unwrap();
    assert_eq!(count, 2);
    assert_eq!(store.get("FOO").unwrap().as_deref(), Some("foo-value"));
    assert_eq!(store.get("BAR").unwrap().as_deref(), Some("bar-value"));
    unsafe {
        std::env::remove_var("SECRET_FOO");
        std::env::remove_var("SECRET_BAR");
    }
}

#[test]
fn backup_copies_ciphertext() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let dst = tmp.path().join("backup.enc");
    assert!(!store.backup(&dst).unwrap());

    store.set("K", "v").unwrap();
    assert!(store.backup(&dst).unwrap());
    assert!(dst.exists());
}

#[test]
fn resolve_secret_reference() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    store.set("TEST_API_KEY", "secret_api_key_123").unwrap();

    let mut mapping = BTreeMap::new();
    mapping.insert("API_KEY".to_string(), "secret:TEST_API_KEY".to_string());
    mapping.insert("PLAIN".to_string(), "plain_value".to_string());

    let resolved = store.resolve(&mapping).unwrap();
    assert_eq!(resolved.get("API_KEY").unwrap(), "secret_api_key_123");
    assert_eq!(resolved.get("PLAIN").unwrap(), "plain_value");
}

#[test]
fn resolve_env_reference() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    unsafe {
        std::env::set_var("SUPERVISOR_TEST_ENV_VAR", "env-value");
    }
    let mut mapping = BTreeMap::new();
    mapping.insert("E".to_string(), "env:SUPERVISOR_TEST_ENV_VAR".to_string());
    let resolved = store.resolve(&mapping).unwrap();
    assert_eq!(resolved.get("E").unwrap(), "env-value");
    unsafe {
        std::env::remove_var("SUPERVISOR_TEST_ENV_VAR");
    }
}

#[test]
fn resolve_file_reference_trims_whitespace() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let file_path = tmp.path().join("value.txt");
    std::fs::write(&file_path, "  padded value  \n").unwrap();

    let mut mapping = BTreeMap::new();
    mapping.insert("F".to_string(), format!("file:{}", file_path.display()));
    let resolved = store.resolve(&mapping).unwrap();
    assert_eq!(resolved.get("F").unwrap(), "padded value");
}

#[test]
fn resolve_missing_secret_is_validation_error() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let mut mapping = BTreeMap::new();
    mapping.insert("MISSING".to_string(), "secret:NOPE".to_string());
    let err = store.resolve(&mapping).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("Secret not found: NOPE"));
}

#[test]
fn resolve_missing_env_is_validation_error() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let mut mapping = BTreeMap::new();
    mapping.insert(
        "E".to_string(),
        "env:SUPERVISOR_DEFINITELY_UNSET_VAR".to_string(),
    );
    let err = store.resolve(&mapping).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(
        err.to_string()
            .contains("Environment variable not found: SUPERVISOR_DEFINITELY_UNSET_VAR")
    );
}

#[test]
fn resolve_unreadable_file_is_validation_error() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let mut mapping = BTreeMap::new();
    mapping.insert(
        "F".to_string(),
        format!("file:{}", tmp.path().join("does-not-exist").display()),
    );
    let err = store.resolve(&mapping).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("Cannot read file"));
}
