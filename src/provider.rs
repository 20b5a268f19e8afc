/*!
Client for the external identity provider.

The provider owns authentication outright: it issues the bearer tokens the
API validates, and it is where accounts (with their role claims) actually
live. This module covers the three interactions the service needs:

  * provisioning and deleting provider accounts through the Admin API,
  * validating client bearer tokens through token introspection,
  * minting `temp_` placeholder identities when the provider is down so
    user creation can limp along (such users cannot authenticate until
    the provider link is repaired).

Admin API calls authenticate with a password-grant admin token that is
cached in-process until shortly before expiry. One process, one cache.
*/
use std::fmt::Write;

use rand::{Rng, distributions};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

const ADMIN_CLIENT_ID: &str = "admin-cli";
const HTTP_TIMEOUT_SECS: u64 = 5;
const TOKEN_EXPIRY_SLACK_SECS: i64 = 10;

const PLACEHOLDER_PREFIX: &str = "temp_";
const PLACEHOLDER_SUFFIX_LENGTH: usize = 8;
const PLACEHOLDER_SUFFIX_CHARS: &str =
"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, PartialEq)]
pub struct ProviderError(String);

impl ProviderError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> ProviderError {
        ProviderError(format!("Identity provider: {}", &e))
    }
}

impl From<String> for ProviderError {
    fn from(s: String) -> ProviderError { ProviderError(s) }
}

/// The identity attached to a live bearer token.
#[derive(Clone, Debug)]
pub struct Identity {
    pub provider_id: String,
    pub roles: Vec<String>,
}

/// What introspecting a bearer token can tell us.
#[derive(Debug)]
pub enum AuthResult {
    Valid(Identity),
    Inactive,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    realm_access: Option<RealmAccess>,
}

#[derive(Deserialize)]
struct RealmRole {
    id: String,
    name: String,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: OffsetDateTime,
}

pub struct Provider {
    base_url: String,
    realm: String,
    client_id: String,
    client_secret: String,
    admin_uname: String,
    admin_password: String,
    http: reqwest::Client,
    admin_token: RwLock<Option<CachedToken>>,
}

/// Is this a `temp_` placeholder minted while the provider was down
/// (and thus unknown to the provider)?
pub fn is_placeholder(provider_id: &str) -> bool {
    provider_id.starts_with(PLACEHOLDER_PREFIX)
}

/// Derive the provider account's first/last name pair from a display name:
/// everything up to the final space is the first name.
fn split_name(name: &str) -> (String, String) {
    match name.rsplit_once(' ') {
        Some((first, last)) => (first.to_owned(), last.to_owned()),
        None => (name.to_owned(), String::new()),
    }
}

impl Provider {
    pub fn new(
        base_url: String,
        realm: String,
        client_id: String,
        client_secret: String,
        admin_uname: String,
        admin_password: String,
    ) -> Self {
        log::trace!(
            "Provider::new( {:?}, {:?}, ... ) called.",
            &base_url, &realm
        );

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            // Building a client with a static configuration only fails
            // when the TLS backend is absent, which is a deploy problem.
            .expect("unable to build HTTP client");

        Self {
            base_url,
            realm,
            client_id,
            client_secret,
            admin_uname,
            admin_password,
            http,
            admin_token: RwLock::new(None),
        }
    }

    /// Mint a placeholder identity for the shadow user record when the
    /// provider can't be reached.
    pub fn placeholder_identity(&self) -> String {
        let chars: Vec<char> = PLACEHOLDER_SUFFIX_CHARS.chars().collect();
        // The slice is a nonempty constant.
        let dist = distributions::Slice::new(&chars).unwrap();
        let suffix: String = rand::thread_rng()
            .sample_iter(&dist)
            .take(PLACEHOLDER_SUFFIX_LENGTH)
            .collect();

        let mut s = String::from(PLACEHOLDER_PREFIX);
        write!(&mut s, "{}_{}", OffsetDateTime::now_utc().unix_timestamp(), &suffix)
            .unwrap();
        s
    }

    /// Get an admin token for the provider's Admin API, reusing the cached
    /// one while it has comfortably more than no life left in it.
    async fn admin_token(&self) -> Result<String, ProviderError> {
        log::trace!("Provider::admin_token() called.");

        {
            let guard = self.admin_token.read().await;
            if let Some(cached) = guard.as_ref() {
                let slack = Duration::seconds(TOKEN_EXPIRY_SLACK_SECS);
                if OffsetDateTime::now_utc() + slack < cached.expires_at {
                    log::trace!("    ...cached admin token still good.");
                    return Ok(cached.token.clone());
                }
            }
        }

        let url = format!(
            "{}/realms/master/protocol/openid-connect/token",
            &self.base_url
        );
        let params = [
            ("grant_type", "password"),
            ("client_id", ADMIN_CLIENT_ID),
            ("username", self.admin_uname.as_str()),
            ("password", self.admin_password.as_str()),
        ];

        let resp = self.http.post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to authenticate with the provider admin endpoint"))?;

        if !resp.status().is_success() {
            return Err(ProviderError(format!(
                "Provider admin token request returned {}.",
                resp.status()
            )));
        }

        let token: TokenResponse = resp.json().await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to read provider admin token response"))?;

        let cached = CachedToken {
            token: token.access_token.clone(),
            expires_at: OffsetDateTime::now_utc()
                + Duration::seconds(token.expires_in),
        };

        {
            let mut guard = self.admin_token.write().await;
            *guard = Some(cached);
        }

        log::trace!("    ...fresh admin token obtained.");
        Ok(token.access_token)
    }

    /**
    Create an account in the provider and map the given realm role onto it.

    Returns the provider's identifier for the new account. The account's
    username is the local part of the email address.
    */
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: crate::user::Role,
    ) -> Result<String, ProviderError> {
        log::trace!(
            "Provider::create_user( {:?}, {:?}, [ password ], {} ) called.",
            name, email, role
        );

        let token = self.admin_token().await?;
        let username = email.split('@').next().unwrap_or(email);
        let (first_name, last_name) = split_name(name);

        let url = format!(
            "{}/admin/realms/{}/users",
            &self.base_url, &self.realm
        );
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "firstName": if first_name.is_empty() { username } else { first_name.as_str() },
            "lastName": last_name,
            "enabled": true,
            "emailVerified": true,
            "credentials": [{
                "type": "password",
                "value": password,
                "temporary": false,
            }],
        });

        let resp = self.http.post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to create provider account"))?;

        if !resp.status().is_success() {
            return Err(ProviderError(format!(
                "Provider account creation returned {}.",
                resp.status()
            )));
        }

        // The Admin API reports the new account's id only through the
        // Location header.
        let location = resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ProviderError(
                "Provider account creation response had no usable Location header.".to_owned()
            ))?;
        let provider_id = location.rsplit('/').next()
            .ok_or_else(|| ProviderError(format!(
                "Unable to extract account id from Location header {:?}.",
                location
            )))?
            .to_owned();

        self.assign_realm_role(&provider_id, role).await?;

        log::info!("Provider account {} created for {:?}.", &provider_id, email);
        Ok(provider_id)
    }

    async fn assign_realm_role(
        &self,
        provider_id: &str,
        role: crate::user::Role,
    ) -> Result<(), ProviderError> {
        log::trace!(
            "Provider::assign_realm_role( {:?}, {} ) called.",
            provider_id, role
        );

        let token = self.admin_token().await?;

        let roles_url = format!(
            "{}/admin/realms/{}/roles",
            &self.base_url, &self.realm
        );
        let roles: Vec<RealmRole> = self.http.get(&roles_url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to list provider realm roles"))?
            .json()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to read provider realm role list"))?;

        let role_name = role.to_string();
        let target = roles.iter().find(|r| r.name == role_name)
            .ok_or_else(|| ProviderError(format!(
                "Realm role {:?} does not exist in the provider.",
                &role_name
            )))?;

        let mapping_url = format!(
            "{}/admin/realms/{}/users/{}/role-mappings/realm",
            &self.base_url, &self.realm, provider_id
        );
        let body = serde_json::json!([{
            "id": &target.id,
            "name": &target.name,
        }]);

        let resp = self.http.post(&mapping_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to map realm role onto provider account"))?;

        if !resp.status().is_success() {
            return Err(ProviderError(format!(
                "Provider role mapping returned {}.",
                resp.status()
            )));
        }

        Ok(())
    }

    /// Delete the provider-side account. The caller is expected to skip
    /// this for placeholder identities.
    pub async fn delete_user(&self, provider_id: &str) -> Result<(), ProviderError> {
        log::trace!("Provider::delete_user( {:?} ) called.", provider_id);

        let token = self.admin_token().await?;
        let url = format!(
            "{}/admin/realms/{}/users/{}",
            &self.base_url, &self.realm, provider_id
        );

        let resp = self.http.delete(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to delete provider account"))?;

        if !resp.status().is_success() {
            return Err(ProviderError(format!(
                "Provider account deletion returned {}.",
                resp.status()
            )));
        }

        log::info!("Provider account {} deleted.", provider_id);
        Ok(())
    }

    /**
    Ask the provider whether a bearer token is live, and if so, whose it is.

    The provider is the single source of truth here; nothing about the
    token is interpreted locally.
    */
    pub async fn introspect(&self, token: &str) -> Result<AuthResult, ProviderError> {
        log::trace!("Provider::introspect( [ bearer token ] ) called.");

        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token/introspect",
            &self.base_url, &self.realm
        );
        let params = [
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self.http.post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to introspect bearer token"))?;

        if !resp.status().is_success() {
            return Err(ProviderError(format!(
                "Provider token introspection returned {}.",
                resp.status()
            )));
        }

        let info: IntrospectionResponse = resp.json().await
            .map_err(|e| ProviderError::from(e)
                .annotate("Unable to read token introspection response"))?;

        if !info.active {
            return Ok(AuthResult::Inactive);
        }

        let provider_id = match info.sub {
            Some(sub) => sub,
            None => {
                // An active token with no subject is a provider
                // misconfiguration, not a client problem.
                return Err(ProviderError(
                    "Active token introspection carried no subject.".to_owned()
                ));
            },
        };

        let roles = info.realm_access.map(|ra| ra.roles).unwrap_or_default();

        Ok(AuthResult::Valid(Identity { provider_id, roles }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> Provider {
        Provider::new(
            "http://localhost:8080".to_owned(),
            "gradeview".to_owned(),
            "gradeview-backend".to_owned(),
            "sekrit".to_owned(),
            "admin".to_owned(),
            "admin".to_owned(),
        )
    }

    #[test]
    fn placeholder_shape() {
        let p = test_provider();
        let id = p.placeholder_identity();

        assert!(is_placeholder(&id));
        let mut parts = id.splitn(3, '_');
        assert_eq!(parts.next(), Some("temp"));
        let stamp = parts.next().unwrap();
        assert!(stamp.parse::<i64>().is_ok());
        assert_eq!(parts.next().unwrap().len(), PLACEHOLDER_SUFFIX_LENGTH);
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder("temp_1700000000_a1b2c3d4"));
        assert!(!is_placeholder("4f1c2a9e-59aa-4f0e-b17c-2f4c7b9d8e11"));
    }

    #[test]
    fn name_splitting() {
        assert_eq!(
            split_name("Nguyen Van An"),
            ("Nguyen Van".to_owned(), "An".to_owned())
        );
        assert_eq!(split_name("Cher"), ("Cher".to_owned(), String::new()));
    }
}
