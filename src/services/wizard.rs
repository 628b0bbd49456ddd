// src/services/wizard.rs
//! Multi-step form wizards.
//!
//! Each form is a fixed sequence of steps with the fields that must be filled
//! before leaving it. Values are plain strings keyed by field name.

use std::collections::BTreeMap;

use crate::error::WizardError;

/// One page of a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardStep {
    pub title: &'static str,
    pub required: &'static [&'static str],
}

const fn step(title: &'static str, required: &'static [&'static str]) -> WizardStep {
    WizardStep { title, required }
}

const ISSUE_CREDENTIAL: &[WizardStep] = &[
    step("Recipient", &["recipient"]),
    step("Credential Details", &["credential_type", "degree_name", "field_of_study"]),
    step("Academic Details", &["graduation_date", "issue_date"]),
    step("Document", &["document_hash"]),
    step("Review", &[]),
];

const REGISTER_INSTITUTION: &[WizardStep] = &[
    step("Institution", &["name", "institution_type", "description", "country", "website"]),
    step("Documents", &[]),
    step("Contact", &["contact_name", "contact_email", "contact_phone", "address"]),
    step("Review", &["terms_accepted"]),
];

const CREATE_IDENTITY: &[WizardStep] = &[
    step("Key Type", &["key_type"]),
    step("Generate", &["public_key"]),
    step("Backup", &["backup_confirmed"]),
    step("Confirm", &[]),
];

const REQUEST_CREDENTIAL: &[WizardStep] = &[
    step("Institution", &["institution"]),
    step("Program", &["credential_type", "program_name", "field_of_study"]),
    step("Dates", &["start_date", "end_date"]),
    step("Review", &[]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    IssueCredential,
    RegisterInstitution,
    CreateIdentity,
    RequestCredential,
}

impl FormKind {
    /// Parses the URL form of a kind, e.g. `issue-credential`.
    pub fn from_slug(slug: &str) -> Option<FormKind> {
        match slug {
            "issue-credential" => Some(FormKind::IssueCredential),
            "register-institution" => Some(FormKind::RegisterInstitution),
            "create-identity" => Some(FormKind::CreateIdentity),
            "request-credential" => Some(FormKind::RequestCredential),
            _ => None,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            FormKind::IssueCredential => "issue-credential",
            FormKind::RegisterInstitution => "register-institution",
            FormKind::CreateIdentity => "create-identity",
            FormKind::RequestCredential => "request-credential",
        }
    }

    pub fn steps(&self) -> &'static [WizardStep] {
        match self {
            FormKind::IssueCredential => ISSUE_CREDENTIAL,
            FormKind::RegisterInstitution => REGISTER_INSTITUTION,
            FormKind::CreateIdentity => CREATE_IDENTITY,
            FormKind::RequestCredential => REQUEST_CREDENTIAL,
        }
    }
}

/// Walks a form step by step, refusing to advance past blank required fields.
#[derive(Debug, Clone)]
pub struct FormWizard {
    kind: FormKind,
    current: usize,
    values: BTreeMap<String, String>,
}

impl FormWizard {
    pub fn new(kind: FormKind) -> Self {
        FormWizard {
            kind,
            current: 0,
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    /// Zero-based index of the current step.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn step(&self) -> WizardStep {
        self.kind.steps()[self.current]
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.kind.steps().len()
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Required fields of the current step that are still blank.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .step()
            .required
            .iter()
            .filter(|field| self.is_blank(field))
            .map(|field| field.to_string())
            .collect();
        // A custom type name is only needed when `Other` is picked
        if self.kind == FormKind::IssueCredential
            && self.step().required.contains(&"credential_type")
            && self.get("credential_type").map(str::trim) == Some("Other")
            && self.is_blank("custom_type")
        {
            missing.push("custom_type".to_string());
        }
        missing
    }

    fn is_blank(&self, field: &str) -> bool {
        self.get(field).map(|v| v.trim().is_empty()).unwrap_or(true)
    }

    fn check(&self) -> Result<(), WizardError> {
        let fields = self.missing_fields();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(WizardError::MissingFields {
                step: self.current + 1,
                fields,
            })
        }
    }

    /// Moves to the next step.
    ///
    /// # Returns
    /// The new step index; on the last step the index is unchanged.
    ///
    /// # Errors
    /// Returns [`WizardError::MissingFields`] naming the blank fields of the
    /// current step (numbered from 1).
    pub fn next(&mut self) -> Result<usize, WizardError> {
        self.check()?;
        if !self.is_last() {
            self.current += 1;
        }
        Ok(self.current)
    }

    pub fn back(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Validates the final step and hands back the collected values.
    pub fn finish(self) -> Result<BTreeMap<String, String>, WizardError> {
        if !self.is_last() {
            return Err(WizardError::NotComplete);
        }
        self.check()?;
        Ok(self.values)
    }

    /// Runs `values` through every step of `kind` at once.
    ///
    /// # Errors
    /// The first step with blank required fields.
    pub fn complete(
        kind: FormKind,
        values: impl IntoIterator<Item = (String, String)>,
    ) -> Result<BTreeMap<String, String>, WizardError> {
        let mut wizard = FormWizard::new(kind);
        wizard.values.extend(values);
        while !wizard.is_last() {
            wizard.next()?;
        }
        wizard.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_next_refuses_blank_required_fields() {
        let mut wizard = FormWizard::new(FormKind::RequestCredential);
        wizard.set("institution", "   ");

        let err = assert_err!(wizard.next());
        assert_eq!(
            err,
            WizardError::MissingFields {
                step: 1,
                fields: vec!["institution".to_string()]
            }
        );
        assert_eq!(wizard.current(), 0);

        wizard.set("institution", "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY");
        assert_eq!(wizard.next(), Ok(1));
        assert_eq!(wizard.step().title, "Program");
        assert_eq!(wizard.back(), 0);
        assert_eq!(wizard.back(), 0);
    }

    #[test]
    fn test_other_type_needs_a_custom_name() {
        let mut wizard = FormWizard::new(FormKind::IssueCredential);
        wizard.set("recipient", "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty");
        wizard.next().unwrap();
        wizard
            .set("credential_type", "Other")
            .set("degree_name", "Diving Instructor")
            .set("field_of_study", "Marine Science");

        assert_eq!(wizard.missing_fields(), vec!["custom_type".to_string()]);
        wizard.set("custom_type", "License");
        assert_ok!(wizard.next());
    }

    #[test]
    fn test_finish_only_on_last_step() {
        let wizard = FormWizard::new(FormKind::CreateIdentity);
        assert_eq!(wizard.finish().unwrap_err(), WizardError::NotComplete);

        let values = [("key_type", "Sr25519"), ("public_key", "0x01"), ("backup_confirmed", "true")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        let done = FormWizard::complete(FormKind::CreateIdentity, values).unwrap();
        assert_eq!(done.get("key_type").map(String::as_str), Some("Sr25519"));
    }

    #[test]
    fn test_complete_reports_first_incomplete_step() {
        let values = [("name", "Tartu"), ("institution_type", "University")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        match FormWizard::complete(FormKind::RegisterInstitution, values) {
            Err(WizardError::MissingFields { step, fields }) => {
                assert_eq!(step, 1);
                assert_eq!(fields, vec!["description", "country", "website"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
