use serde::{Deserialize, Serialize};

use crate::conditions::ConditionRegistry;
use crate::error::AdminError;
use crate::session::{ParticipantSession, Turn};

/// Snapshot of one participant's session, as handed to the researcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub participant_id: String,
    pub assigned_group: String,
    pub condition_detail: String,
    pub chat_history: Vec<Turn>,
}

impl SessionLog {
    /// Build the log for a logged-in participant.
    pub fn from_session(
        session: &ParticipantSession,
        registry: &ConditionRegistry,
    ) -> Result<Self, AdminError> {
        let participant_id = session.participant_id().ok_or(AdminError::NothingToExport)?;
        let assigned_group = session.assigned_group().ok_or(AdminError::NothingToExport)?;
        let condition_detail = registry
            .get(assigned_group)
            .map(|c| c.label.clone())
            .unwrap_or_default();
        Ok(Self {
            participant_id: participant_id.to_string(),
            assigned_group: assigned_group.to_string(),
            condition_detail,
            chat_history: session.transcript().to_vec(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Download name, e.g. `log_P01_G2.json`.
    pub fn file_name(&self) -> String {
        format!(
            "log_{}_{}.json",
            sanitize_file_component(&self.participant_id),
            sanitize_file_component(&self.assigned_group)
        )
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_export_requires_login() {
        let s = ParticipantSession::new();
        let err = SessionLog::from_session(&s, &ConditionRegistry::builtin()).unwrap_err();
        assert_eq!(err, AdminError::NothingToExport);
    }

    #[test]
    fn test_export_fields_from_session() {
        let reg = ConditionRegistry::builtin();
        let mut s = ParticipantSession::new();
        s.login("P01", &reg, &mut StdRng::seed_from_u64(11)).unwrap();
        let group = s.assigned_group().unwrap().to_string();
        let log = SessionLog::from_session(&s, &reg).unwrap();
        assert_eq!(log.participant_id, "P01");
        assert_eq!(log.assigned_group, group);
        assert_eq!(log.condition_detail, reg.get(&group).unwrap().label);
        assert!(log.chat_history.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let log = SessionLog {
            participant_id: "P01".into(),
            assigned_group: "G2".into(),
            condition_detail: "Instructed_Baseline".into(),
            chat_history: vec![Turn::user("q"), Turn::assistant("a")],
        };
        let v: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(v["participant_id"], "P01");
        assert_eq!(v["assigned_group"], "G2");
        assert_eq!(v["condition_detail"], "Instructed_Baseline");
        assert_eq!(v["chat_history"][0]["role"], "user");
        assert_eq!(v["chat_history"][1]["content"], "a");
    }

    #[test]
    fn test_file_name_encodes_id_and_group() {
        let log = SessionLog {
            participant_id: "P 01/x".into(),
            assigned_group: "G2".into(),
            condition_detail: String::new(),
            chat_history: vec![],
        };
        assert_eq!(log.file_name(), "log_P_01_x_G2.json");
    }
}
