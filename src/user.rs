/*!
Users as the database and the API see them.

Every user is a "shadow" of an account in the external identity provider:
the `provider_id` column ties the local row to the provider's subject
identifier. Users created while the provider is unreachable get a `temp_`
placeholder there instead (see `crate::provider`).
*/
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin   => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(format!("{:?} is not a valid role.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub provider_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// The slimmed-down shape embedded in other resources' responses
/// (a grade's teacher, an enrollment's student, a request's approver).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> UserSummary {
        UserSummary {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Admin, Role::Teacher, Role::Student] {
            let s = role.to_string();
            assert_eq!(s.parse::<Role>().unwrap(), role);
        }
        assert!("boss".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn user_wire_format() {
        let u = User {
            id: 7,
            provider_id: "4f1c2a9e-0000-0000-0000-000000000000".to_owned(),
            name: "Jenny Teacher".to_owned(),
            email: "jenny@example.edu".to_owned(),
            role: Role::Teacher,
        };

        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["providerId"], "4f1c2a9e-0000-0000-0000-000000000000");
        assert_eq!(v["role"], "teacher");
    }
}
