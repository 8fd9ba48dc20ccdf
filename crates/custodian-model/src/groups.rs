// SPDX-License-Identifier: Apache-2.0

/// Parses a group reference of the form `@<ownerAlias>.<groupName>`.
/// Anything else is a plain member entry and passes through expansion.
#[must_use]
pub fn parse_group_ref(entry: &str) -> Option<(&str, &str)> {
    let rest = entry.strip_prefix('@')?;
    let (alias, group) = rest.split_once('.')?;
    if alias.is_empty() || group.is_empty() {
        return None;
    }
    Some((alias, group))
}

/// Sorted, deduplicated copy of a member list.
#[must_use]
pub fn dedup_sorted(mut entries: Vec<String>) -> Vec<String> {
    entries.sort();
    entries.dedup();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_refs_need_prefix_alias_and_group() {
        assert_eq!(parse_group_ref("@platform.admins"), Some(("platform", "admins")));
        assert_eq!(parse_group_ref("alice"), None);
        assert_eq!(parse_group_ref("@platform"), None);
        assert_eq!(parse_group_ref("@.admins"), None);
    }

    #[test]
    fn dedup_sorted_removes_duplicates() {
        let out = dedup_sorted(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }
}
