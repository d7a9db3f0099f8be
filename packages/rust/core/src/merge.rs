//! Folding worker updates into the accumulating profile.
//!
//! Rules, in order:
//! 1. no current profile: start from the unresolved placeholder
//! 2. no update: the current profile is returned unchanged
//! 3. contacts are appended unless a contact with the exact same name exists
//! 4. incoming metrics replace the current metrics as a whole
//! 5. present scalar fields overwrite; absent or blank ones never clear

use dossier_shared::{Contact, Profile, ProfilePatch};

/// Merge `update` into `current`.
pub fn merge(current: Option<Profile>, update: Option<ProfilePatch>) -> Profile {
    let profile = current.unwrap_or_else(Profile::unresolved);
    match update {
        Some(update) => apply(profile, update),
        None => profile,
    }
}

/// Apply one patch to a profile.
pub fn apply(mut profile: Profile, update: ProfilePatch) -> Profile {
    append_contacts(&mut profile.contacts, update.contacts);

    if let Some(metrics) = update.metrics {
        profile.metrics = Some(metrics);
    }

    if let Some(name) = present(update.name) {
        profile.name = name;
    }
    overwrite(&mut profile.description, update.description);
    overwrite(&mut profile.industry, update.industry);
    overwrite(&mut profile.website, update.website);

    profile
}

/// First contact with a given name wins; later ones are dropped whole.
fn append_contacts(existing: &mut Vec<Contact>, incoming: Vec<Contact>) {
    for contact in incoming {
        if !existing.iter().any(|c| c.name == contact.name) {
            existing.push(contact);
        }
    }
}

fn overwrite(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = present(value) {
        *slot = Some(value);
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use dossier_shared::{Metrics, UNRESOLVED_NAME};

    use super::*;

    fn acme() -> Profile {
        Profile {
            name: "Acme Srl".into(),
            description: Some("Widget maker".into()),
            website: Some("acme.it".into()),
            contacts: vec![Contact::new("Alice").with_role("CEO")],
            ..Profile::unresolved()
        }
    }

    #[test]
    fn missing_update_is_identity() {
        assert_eq!(merge(Some(acme()), None), acme());
    }

    #[test]
    fn missing_everything_is_placeholder() {
        let profile = merge(None, None);
        assert_eq!(profile.name, UNRESOLVED_NAME);
        assert!(profile.contacts.is_empty());
    }

    #[test]
    fn first_update_applies_to_placeholder() {
        let profile = merge(None, Some(ProfilePatch::contacts(vec![Contact::new("Bob")])));
        assert_eq!(profile.name, UNRESOLVED_NAME);
        assert_eq!(profile.contacts, vec![Contact::new("Bob")]);
    }

    #[test]
    fn duplicate_contact_names_are_dropped() {
        let update = ProfilePatch::contacts(vec![
            Contact::new("Alice").with_role("CTO"),
            Contact::new("Bob").with_role("CFO"),
        ]);
        let merged = merge(Some(acme()), Some(update));
        assert_eq!(
            merged.contacts,
            vec![
                Contact::new("Alice").with_role("CEO"),
                Contact::new("Bob").with_role("CFO"),
            ]
        );
    }

    #[test]
    fn duplicates_inside_one_update_are_dropped() {
        let update = ProfilePatch::contacts(vec![
            Contact::new("Bob").with_email("bob@acme.it"),
            Contact::new("Bob").with_email("robert@acme.it"),
        ]);
        let merged = merge(Some(acme()), Some(update));
        assert_eq!(merged.contacts.len(), 2);
        assert_eq!(merged.contacts[1].email.as_deref(), Some("bob@acme.it"));
    }

    #[test]
    fn name_match_is_case_sensitive() {
        let merged = merge(Some(acme()), Some(ProfilePatch::contacts(vec![Contact::new("alice")])));
        assert_eq!(merged.contacts.len(), 2);
    }

    #[test]
    fn merging_twice_is_idempotent_for_contacts() {
        let update = ProfilePatch::contacts(vec![Contact::new("Bob"), Contact::new("Carla")]);
        let once = merge(Some(acme()), Some(update.clone()));
        let twice = merge(Some(once.clone()), Some(update));
        assert_eq!(once.contacts, twice.contacts);
        assert_eq!(once, twice);
    }

    #[test]
    fn metrics_are_replaced_wholesale() {
        let mut current = acme();
        current.metrics = Some(Metrics {
            revenue: Some(100.0),
            ..Default::default()
        });
        let merged = merge(
            Some(current),
            Some(ProfilePatch::metrics(Metrics {
                employees: Some(5),
                ..Default::default()
            })),
        );
        assert_eq!(
            merged.metrics,
            Some(Metrics {
                employees: Some(5),
                ..Default::default()
            })
        );
    }

    #[test]
    fn absent_and_blank_fields_never_clear() {
        let update = ProfilePatch {
            name: Some("  ".into()),
            description: None,
            industry: Some("Manufacturing".into()),
            website: Some(String::new()),
            ..Default::default()
        };
        let merged = merge(Some(acme()), Some(update));
        assert_eq!(merged.name, "Acme Srl");
        assert_eq!(merged.description.as_deref(), Some("Widget maker"));
        assert_eq!(merged.industry.as_deref(), Some("Manufacturing"));
        assert_eq!(merged.website.as_deref(), Some("acme.it"));
    }

    #[test]
    fn present_fields_overwrite() {
        let update = ProfilePatch {
            name: Some("ACME S.r.l.".into()),
            website: Some("https://www.acme.it".into()),
            ..Default::default()
        };
        let merged = merge(Some(acme()), Some(update));
        assert_eq!(merged.name, "ACME S.r.l.");
        assert_eq!(merged.website.as_deref(), Some("https://www.acme.it"));
        assert_eq!(merged.contacts.len(), 1);
    }
}
