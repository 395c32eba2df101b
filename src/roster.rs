//! Student roster parsing and tenant namespace derivation
//!
//! The roster arrives as a three-column CSV export (`OrgDefinedId`,
//! `Username`, `Group`) with a header row. Namespace names are pure
//! functions of (lab name, roster, mode): no randomness, no counters, so a
//! given roster always derives the same namespaces.

use std::io::Read;

use crate::{Error, Result};

/// One roster entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Student {
    /// External identifier from the roster export
    pub id: String,
    /// Display name, e.g. `"Jane Doe"`
    pub name: String,
    /// Group number, if the group cell parsed to one
    pub group: Option<u32>,
}

/// Whether tenants are individual students or student groups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionMode {
    /// One namespace per roster entry
    Individual,
    /// One namespace per distinct group number
    Group,
}

/// Parse the student roster from CSV bytes
///
/// The header row is skipped. A leading `#` on the id or name cells is
/// stripped (spreadsheet exports prefix them). The group cell is free text
/// such as `"Group 3"`; anything whose second word is not an integer means
/// "no group".
pub fn parse_roster<R: Read>(reader: R) -> Result<Vec<Student>> {
    let mut rows = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut students = Vec::new();
    for (index, record) in rows.records().enumerate() {
        let record =
            record.map_err(|e| Error::validation(format!("malformed roster row: {e}")))?;

        let id = record
            .get(0)
            .ok_or_else(|| Error::validation(format!("roster row {} has no id", index + 1)))?;
        let name = record
            .get(1)
            .ok_or_else(|| Error::validation(format!("roster row {} has no name", index + 1)))?;

        let id = id.strip_prefix('#').unwrap_or(id).trim();
        let name = name.strip_prefix('#').unwrap_or(name).trim();
        if name.is_empty() {
            return Err(Error::validation(format!(
                "roster row {} has an empty name",
                index + 1
            )));
        }

        // "Group 3" => 3; anything else means no group assignment.
        let group = record
            .get(2)
            .and_then(|cell| cell.split_whitespace().nth(1))
            .and_then(|number| number.parse::<u32>().ok());

        students.push(Student {
            id: id.to_string(),
            name: name.to_string(),
            group,
        });
    }

    Ok(students)
}

/// Lowercase, hyphen-joined slug of a display name
///
/// `"Jane Doe"` becomes `"jane-doe"`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// The lab's shared namespace, `ns-<lab>`
pub fn lab_namespace(lab_name: &str) -> String {
    format!("ns-{lab_name}")
}

/// A tenant namespace, `ns-<lab>-<key>`
pub fn tenant_namespace(lab_name: &str, key: &str) -> String {
    format!("ns-{lab_name}-{key}")
}

/// Recover the tenant key from a namespace name
///
/// Inverse of [`tenant_namespace`] for namespaces of the given lab.
pub fn tenant_key<'a>(namespace: &'a str, lab_name: &str) -> Option<&'a str> {
    namespace.strip_prefix(&format!("ns-{lab_name}-"))
}

/// Derive the ordered tenant namespace list for a roster
///
/// Individual mode yields one namespace per roster entry, keyed by the
/// slugged display name. Group mode yields one namespace per distinct group
/// number in first-seen order; entries with no group contribute nothing.
pub fn derive_tenant_namespaces(
    students: &[Student],
    lab_name: &str,
    mode: ProvisionMode,
) -> Vec<String> {
    match mode {
        ProvisionMode::Individual => students
            .iter()
            .map(|student| tenant_namespace(lab_name, &slugify(&student.name)))
            .collect(),
        ProvisionMode::Group => {
            let mut seen = Vec::new();
            for student in students {
                if let Some(group) = student.group {
                    if !seen.contains(&group) {
                        seen.push(group);
                    }
                }
            }
            seen.into_iter()
                .map(|group| tenant_namespace(lab_name, &format!("group-{group}")))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(name: &str, group: Option<u32>) -> Student {
        Student {
            id: "X123".to_string(),
            name: name.to_string(),
            group,
        }
    }

    // =========================================================================
    // Roster parsing
    // =========================================================================

    #[test]
    fn test_parse_roster_strips_hash_prefixes() {
        let csv = "OrgDefinedId,Username,Group\n#X123,#Jane Doe,Group 3\n";
        let students = parse_roster(csv.as_bytes()).unwrap();

        assert_eq!(
            students,
            vec![Student {
                id: "X123".to_string(),
                name: "Jane Doe".to_string(),
                group: Some(3),
            }]
        );
    }

    #[test]
    fn test_parse_roster_unparsable_group_means_none() {
        let csv = "OrgDefinedId,Username,Group\n\
                   X1,Jane Doe,Group 1\n\
                   X2,John Roe,\n\
                   X3,Ada Lovelace,ungrouped\n";
        let students = parse_roster(csv.as_bytes()).unwrap();

        assert_eq!(students[0].group, Some(1));
        assert_eq!(students[1].group, None);
        assert_eq!(students[2].group, None);
    }

    #[test]
    fn test_parse_roster_empty_file_yields_no_students() {
        let students = parse_roster("OrgDefinedId,Username,Group\n".as_bytes()).unwrap();
        assert!(students.is_empty());
    }

    #[test]
    fn test_parse_roster_rejects_empty_name() {
        let csv = "OrgDefinedId,Username,Group\nX1,,Group 1\n";
        let err = parse_roster(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    // =========================================================================
    // Namespace derivation
    // =========================================================================

    /// Story: namespace names are deterministic
    ///
    /// For a fixed roster, lab name, and mode the derived set is always the
    /// same, which is what makes provisioning reproducible and re-entrant.
    #[test]
    fn story_individual_mode_derives_slugged_namespaces() {
        let students = vec![student("Jane Doe", None)];

        let namespaces = derive_tenant_namespaces(&students, "demo", ProvisionMode::Individual);
        assert_eq!(namespaces, vec!["ns-demo-jane-doe".to_string()]);

        // Same inputs, same output.
        let again = derive_tenant_namespaces(&students, "demo", ProvisionMode::Individual);
        assert_eq!(namespaces, again);
    }

    /// Story: group mode deduplicates by group number in first-seen order
    ///
    /// Students with no group assignment contribute no namespace.
    #[test]
    fn story_group_mode_dedups_and_skips_ungrouped() {
        let students = vec![
            student("A B", Some(1)),
            student("C D", Some(1)),
            student("E F", Some(2)),
            student("G H", None),
        ];

        let namespaces = derive_tenant_namespaces(&students, "demo", ProvisionMode::Group);
        assert_eq!(
            namespaces,
            vec!["ns-demo-group-1".to_string(), "ns-demo-group-2".to_string()]
        );
    }

    #[test]
    fn test_group_mode_preserves_first_seen_order() {
        let students = vec![
            student("A B", Some(7)),
            student("C D", Some(2)),
            student("E F", Some(7)),
        ];

        let namespaces = derive_tenant_namespaces(&students, "demo", ProvisionMode::Group);
        assert_eq!(
            namespaces,
            vec!["ns-demo-group-7".to_string(), "ns-demo-group-2".to_string()]
        );
    }

    #[test]
    fn test_tenant_key_roundtrip() {
        let namespace = tenant_namespace("demo", "jane-doe");
        assert_eq!(tenant_key(&namespace, "demo"), Some("jane-doe"));
        // The lab's own shared namespace has no tenant key.
        assert_eq!(tenant_key(&lab_namespace("demo"), "demo"), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Jane Doe"), "jane-doe");
        assert_eq!(slugify("  Ada   Lovelace "), "ada-lovelace");
        assert_eq!(slugify("single"), "single");
    }
}
