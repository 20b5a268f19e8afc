/*!
Subject-registration requests and their approval lifecycle.

A request starts `pending` and moves exactly once, to `approved` or
`rejected`, by an admin decision. Approval creates the corresponding
enrollment as a side effect unless one already exists. There is no
transition out of a terminal state and no student-side cancellation.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::subject::SubjectSummary;
use crate::user::UserSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            RegistrationStatus::Pending  => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            _ => Err(format!("{:?} is not a valid registration status.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub academic_year: String,
    pub status: RegistrationStatus,
    pub reason: Option<String>,
    pub admin_note: Option<String>,
    pub approved_by: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
}

/// A request with its student, subject, and (possibly absent) approver
/// joined in, as returned by the list endpoints.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDetail {
    #[serde(flatten)]
    pub request: RegistrationRequest,
    pub student: Option<UserSummary>,
    pub subject: Option<SubjectSummary>,
    pub approver: Option<UserSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn status_round_trip() {
        for status in [
            RegistrationStatus::Pending,
            RegistrationStatus::Approved,
            RegistrationStatus::Rejected,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<RegistrationStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<RegistrationStatus>().is_err());
    }

    #[test]
    fn request_wire_format() {
        let r = RegistrationRequest {
            id: 21,
            student_id: 4,
            subject_id: 2,
            academic_year: "2023-2024".to_owned(),
            status: RegistrationStatus::Pending,
            reason: Some("Needed for my major.".to_owned()),
            admin_note: None,
            approved_by: None,
            requested_at: datetime!(2024-02-01 12:00 UTC),
            approved_at: None,
        };

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "pending");
        assert_eq!(v["approvedAt"], serde_json::Value::Null);
        assert_eq!(v["requestedAt"], "2024-02-01T12:00:00Z");
    }
}
