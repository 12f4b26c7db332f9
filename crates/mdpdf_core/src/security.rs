//! crates/mdpdf_core/src/security.rs
//!
//! Path confinement, capability-token validation and bounded reads.
//!
//! [`confine`] is the single choke point for building filesystem paths from
//! anything a caller controls. Nothing else in the workspace joins user input
//! onto a directory by plain concatenation.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::domain::SessionToken;
use crate::error::{StorageError, StorageResult};

/// Lowercase 8-4-4-4-12 layout with version nibble 4 and variant nibble 8/9/a/b.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("token pattern is a valid regex")
});

//=========================================================================================
// TokenValidator
//=========================================================================================

/// Validates an untrusted session identifier and returns its canonical token.
///
/// Only the exact canonical layout is accepted. Uppercase, braced, URN or
/// whitespace-padded spellings of the same bits are rejected rather than
/// normalized, because the result is used as a directory name.
pub fn normalize_token(raw: &str) -> StorageResult<SessionToken> {
    if !TOKEN_RE.is_match(raw) {
        return Err(StorageError::InvalidToken);
    }
    let id = Uuid::parse_str(raw).map_err(|_| StorageError::InvalidToken)?;
    if id.get_version_num() != 4 || id.hyphenated().to_string() != raw {
        return Err(StorageError::InvalidToken);
    }
    Ok(SessionToken::from_uuid(id))
}

/// True iff `name` is a single plain path component.
pub fn is_safe_basename(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', ':', '\0']) {
        return false;
    }
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

//=========================================================================================
// PathGuard
//=========================================================================================

/// Joins `segments` onto `base` and proves the result stays inside `base`.
///
/// `base` must already be canonical. The joined candidate is resolved
/// component by component: symlinks that exist are followed, `..` is applied
/// to the resolved prefix, and components that do not exist yet are kept
/// lexically so the function also works for files about to be created.
/// A dangling or looping symlink is treated as an escape.
pub fn confine<I, S>(base: &Path, segments: I) -> StorageResult<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let mut candidate = base.to_path_buf();
    for segment in segments {
        candidate.push(segment);
    }

    let resolved = resolve_lenient(&candidate)?;
    if resolved.starts_with(base) {
        Ok(resolved)
    } else {
        Err(StorageError::PathTraversal)
    }
}

fn resolve_lenient(path: &Path) -> StorageResult<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                match fs::symlink_metadata(&resolved) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        resolved =
                            fs::canonicalize(&resolved).map_err(|_| StorageError::PathTraversal)?;
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(resolved)
}

//=========================================================================================
// Bounded reads
//=========================================================================================

/// Reads at most `limit` bytes, failing with `TooLarge` if there is more.
///
/// One byte past the limit is requested so an oversized body is detected
/// without trusting any declared length.
pub fn read_limited<R: Read>(reader: R, limit: u64) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(StorageError::TooLarge { limit });
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        (dir, base)
    }

    #[test]
    fn accepts_canonical_v4_tokens() {
        let raw = "3f2b8c1e-9d4a-4e7b-a1c2-0d9e8f7a6b5c";
        assert_eq!(normalize_token(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn rejects_non_canonical_tokens() {
        for raw in [
            "",
            " 3f2b8c1e-9d4a-4e7b-a1c2-0d9e8f7a6b5c",
            "3f2b8c1e-9d4a-4e7b-a1c2-0d9e8f7a6b5c\n",
            "3F2B8C1E-9D4A-4E7B-A1C2-0D9E8F7A6B5C",
            "{3f2b8c1e-9d4a-4e7b-a1c2-0d9e8f7a6b5c}",
            "urn:uuid:3f2b8c1e-9d4a-4e7b-a1c2-0d9e8f7a6b5c",
            "3f2b8c1e9d4a4e7ba1c20d9e8f7a6b5c",
            // version 1
            "3f2b8c1e-9d4a-1e7b-a1c2-0d9e8f7a6b5c",
            // variant nibble outside 8..b
            "3f2b8c1e-9d4a-4e7b-c1c2-0d9e8f7a6b5c",
            "../../etc/passwd",
        ] {
            assert!(
                matches!(normalize_token(raw), Err(StorageError::InvalidToken)),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn safe_basename_rules() {
        assert!(is_safe_basename("a.png"));
        assert!(is_safe_basename(".hidden"));
        for bad in ["", ".", "..", "a/b.png", "a\\b.png", "/etc", "C:evil.png", "x\0.png"] {
            assert!(!is_safe_basename(bad), "accepted {bad:?}");
        }
    }

    #[test]
    fn confine_allows_base_and_descendants() {
        let (_dir, base) = sandbox();
        assert_eq!(confine(&base, std::iter::empty::<&str>()).unwrap(), base);
        assert_eq!(confine(&base, ["images", "a.png"]).unwrap(), base.join("images/a.png"));
        assert_eq!(confine(&base, ["images/../doc.md"]).unwrap(), base.join("doc.md"));
    }

    #[test]
    fn confine_rejects_escapes() {
        let (_dir, base) = sandbox();
        for segment in ["..", "../sibling", "a/../../b", "/etc/passwd"] {
            assert!(
                matches!(confine(&base, [segment]), Err(StorageError::PathTraversal)),
                "accepted {segment:?}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn confine_rejects_symlink_crossing_the_boundary() {
        let (_dir, base) = sandbox();
        let (_outside_dir, outside) = sandbox();
        std::os::unix::fs::symlink(&outside, base.join("link")).unwrap();
        assert!(matches!(
            confine(&base, ["link", "x.png"]),
            Err(StorageError::PathTraversal)
        ));

        std::os::unix::fs::symlink(base.join("nowhere"), base.join("dangling")).unwrap();
        assert!(matches!(
            confine(&base, ["dangling"]),
            Err(StorageError::PathTraversal)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn confine_allows_symlink_that_stays_inside() {
        let (_dir, base) = sandbox();
        fs::create_dir(base.join("real")).unwrap();
        std::os::unix::fs::symlink(base.join("real"), base.join("alias")).unwrap();
        assert_eq!(confine(&base, ["alias", "f"]).unwrap(), base.join("real/f"));
    }

    #[test]
    fn read_limited_detects_one_byte_over() {
        assert_eq!(read_limited(&b"abcd"[..], 4).unwrap().as_ref(), b"abcd");
        assert!(matches!(
            read_limited(&b"abcde"[..], 4),
            Err(StorageError::TooLarge { limit: 4 })
        ));
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("..".to_string()),
            Just(".".to_string()),
            Just("/".to_string()),
            Just("/etc".to_string()),
            Just("images".to_string()),
            Just("a/../..".to_string()),
            "[a-z./\\\\]{0,8}",
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: a confined path is always the base or one of its descendants.
        #[test]
        fn prop_confine_never_escapes(segments in prop::collection::vec(segment(), 0..6)) {
            let (_dir, base) = sandbox();
            if let Ok(path) = confine(&base, &segments) {
                prop_assert!(path.starts_with(&base));
            }
        }

        /// Property: arbitrary strings either confine inside the base or fail.
        #[test]
        fn prop_confine_arbitrary_input(raw in any::<String>()) {
            let (_dir, base) = sandbox();
            if let Ok(path) = confine(&base, [raw.as_str()]) {
                prop_assert!(path.starts_with(&base));
            }
        }

        /// Property: anything that is not exactly a canonical v4 string is rejected.
        #[test]
        fn prop_uppercased_tokens_rejected(_seed in 0u8..32) {
            let token = SessionToken::generate().to_string();
            prop_assert!(normalize_token(&token.to_uppercase()).is_err());
            let padded = format!("{token} ");
            prop_assert!(normalize_token(&padded).is_err());
            prop_assert!(normalize_token(&token).is_ok());
        }
    }
}
