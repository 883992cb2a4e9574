//! File naming and layout.
//!
//! ```text
//! <repo>/
//!   README.md
//!   .flow_state_<instance>.json
//!   flows/<instance>/<category>/<name>_id_<last4>.json
//!   flows/<instance>/<category>/deleted/<name>_id_<last4>.json
//! ```
//!
//! Every path returned here is relative to the repository root so it can be
//! handed to the commit store unchanged.

use std::path::PathBuf;

use flowkeep_core::{FlowId, InstanceName, UNCATEGORIZED};

pub const FLOWS_DIR: &str = "flows";
pub const ARCHIVE_DIR: &str = "deleted";
pub const README_FILE: &str = "README.md";

const ID_SUFFIX_LEN: usize = 4;

/// Replace whitespace and path separators with `_`, one per character.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Last four characters of the id, or the whole id when shorter.
pub fn id_suffix(id: &FlowId) -> String {
    let chars: Vec<char> = id.0.chars().collect();
    let start = chars.len().saturating_sub(ID_SUFFIX_LEN);
    chars[start..].iter().collect()
}

/// `<sanitized name>_id_<last4>.json`
pub fn derived_name(name: &str, id: &FlowId) -> String {
    let mut stem = sanitize(name.trim());
    if stem.is_empty() {
        stem = "unnamed".to_string();
    }
    format!("{stem}_id_{}.json", id_suffix(id))
}

/// Directory name for a category; never escapes the instance directory.
pub fn category_dir(category: &str) -> String {
    let dir = sanitize(category.trim());
    if dir.is_empty() || dir.chars().all(|c| c == '.') {
        UNCATEGORIZED.to_string()
    } else {
        dir
    }
}

/// `flows/<instance>/<category>/<file_name>`
pub fn live_path(instance: &InstanceName, category: &str, file_name: &str) -> PathBuf {
    PathBuf::from(FLOWS_DIR)
        .join(&instance.0)
        .join(category_dir(category))
        .join(file_name)
}

/// `flows/<instance>/<category>/deleted/<file_name>`
pub fn archived_path(instance: &InstanceName, category: &str, file_name: &str) -> PathBuf {
    PathBuf::from(FLOWS_DIR)
        .join(&instance.0)
        .join(category_dir(category))
        .join(ARCHIVE_DIR)
        .join(file_name)
}

/// `flows/<instance>`
pub fn instance_dir(instance: &InstanceName) -> PathBuf {
    PathBuf::from(FLOWS_DIR).join(&instance.0)
}

/// `.flow_state_<instance>.json`
pub fn state_file_name(instance: &InstanceName) -> String {
    format!(".flow_state_{}.json", instance.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_name_matches_expected_shape() {
        let name = derived_name("Test Flow", &FlowId::from("abc123"));
        assert_eq!(name, "Test_Flow_id_3123.json");
    }

    #[test]
    fn derived_name_is_deterministic() {
        let id = FlowId::from("f00dcafe-0001");
        let first = derived_name("Support Bot", &id);
        let _other = derived_name("Something Else", &FlowId::from("zzzz"));
        assert_eq!(derived_name("Support Bot", &id), first);
    }

    #[test]
    fn separators_and_whitespace_become_underscores() {
        assert_eq!(sanitize("a/b\\c d\te"), "a_b_c_d_e");
        assert_eq!(sanitize("two  spaces"), "two__spaces");
    }

    #[test]
    fn short_and_multibyte_ids_use_whole_characters() {
        assert_eq!(id_suffix(&FlowId::from("ab")), "ab");
        assert_eq!(id_suffix(&FlowId::from("xxéüñç")), "éüñç");
    }

    #[test]
    fn blank_name_becomes_unnamed() {
        assert_eq!(derived_name("  ", &FlowId::from("123456")), "unnamed_id_3456.json");
    }

    #[test]
    fn distinct_suffixes_never_collide() {
        let a = derived_name("Same", &FlowId::from("id-0001"));
        let b = derived_name("Same", &FlowId::from("id-0002"));
        assert_ne!(a, b);
    }

    #[test]
    fn category_dir_cannot_escape() {
        assert_eq!(category_dir(".."), UNCATEGORIZED);
        assert_eq!(category_dir(""), UNCATEGORIZED);
        assert_eq!(category_dir("../etc"), ".._etc");
        assert_eq!(category_dir("Multi Agent"), "Multi_Agent");
    }

    #[test]
    fn live_and_archived_paths() {
        let instance = InstanceName::from("inst");
        assert_eq!(
            live_path(&instance, "chatflow", "Test_Flow_id_3123.json"),
            PathBuf::from("flows/inst/chatflow/Test_Flow_id_3123.json")
        );
        assert_eq!(
            archived_path(&instance, "chatflow", "Test_Flow_id_3123.json"),
            PathBuf::from("flows/inst/chatflow/deleted/Test_Flow_id_3123.json")
        );
        assert_eq!(state_file_name(&instance), ".flow_state_inst.json");
    }
}
