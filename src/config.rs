/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::provider::Provider;
use crate::store::Store;

const DEFAULT_ACADEMIC_YEAR: &str = "2023-2024";

#[derive(Deserialize)]
struct ConfigFile {
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    provider_url: Option<String>,
    provider_realm: Option<String>,
    provider_client_id: Option<String>,
    provider_client_secret: Option<String>,
    provider_admin_uname: Option<String>,
    provider_admin_password: Option<String>,
    default_academic_year: Option<String>,
}

#[derive(Debug)]
pub struct Cfg {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub addr: SocketAddr,
    pub provider_url: String,
    pub provider_realm: String,
    pub provider_client_id: String,
    pub provider_client_secret: String,
    pub provider_admin_uname: String,
    pub provider_admin_password: String,
    pub default_academic_year: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_host: "localhost".to_owned(),
            db_port: 5432,
            db_name: "gradeview".to_owned(),
            db_user: "postgres".to_owned(),
            db_password: "postgres".to_owned(),
            addr: SocketAddr::new("0.0.0.0".parse().unwrap(), 5000),
            provider_url: "http://localhost:8080".to_owned(),
            provider_realm: "gradeview".to_owned(),
            provider_client_id: "gradeview-backend".to_owned(),
            provider_client_secret: String::new(),
            provider_admin_uname: "admin".to_owned(),
            provider_admin_password: "admin".to_owned(),
            default_academic_year: DEFAULT_ACADEMIC_YEAR.to_owned(),
        }
    }
}

fn env_override(field: &mut String, var: &str) {
    if let Ok(s) = std::env::var(var) {
        *field = s;
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_host { c.db_host = s; }
        if let Some(n) = cf.db_port { c.db_port = n; }
        if let Some(s) = cf.db_name { c.db_name = s; }
        if let Some(s) = cf.db_user { c.db_user = s; }
        if let Some(s) = cf.db_password { c.db_password = s; }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port { c.addr.set_port(n); }
        if let Some(s) = cf.provider_url { c.provider_url = s; }
        if let Some(s) = cf.provider_realm { c.provider_realm = s; }
        if let Some(s) = cf.provider_client_id { c.provider_client_id = s; }
        if let Some(s) = cf.provider_client_secret { c.provider_client_secret = s; }
        if let Some(s) = cf.provider_admin_uname { c.provider_admin_uname = s; }
        if let Some(s) = cf.provider_admin_password { c.provider_admin_password = s; }
        if let Some(s) = cf.default_academic_year { c.default_academic_year = s; }

        Ok(c)
    }

    /**
    Load the effective configuration: compiled defaults, overlaid by the
    TOML file named in `GRADEVIEW_CONFIG` (if set), overlaid by individual
    environment variables.
    */
    pub fn load() -> Result<Self, String> {
        let mut c = match std::env::var("GRADEVIEW_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        env_override(&mut c.db_host, "DB_HOST");
        if let Ok(s) = std::env::var("DB_PORT") {
            c.db_port = s.parse().map_err(|e| format!(
                "Error parsing DB_PORT value {:?}: {}", &s, &e
            ))?;
        }
        env_override(&mut c.db_name, "DB_NAME");
        env_override(&mut c.db_user, "DB_USER");
        env_override(&mut c.db_password, "DB_PASSWORD");
        if let Ok(s) = std::env::var("HOST") {
            c.addr.set_ip(s.parse().map_err(|e| format!(
                "Error parsing HOST value {:?} as IP address: {}", &s, &e
            ))?);
        }
        if let Ok(s) = std::env::var("PORT") {
            c.addr.set_port(s.parse().map_err(|e| format!(
                "Error parsing PORT value {:?}: {}", &s, &e
            ))?);
        }
        env_override(&mut c.provider_url, "PROVIDER_URL");
        env_override(&mut c.provider_realm, "PROVIDER_REALM");
        env_override(&mut c.provider_client_id, "PROVIDER_CLIENT_ID");
        env_override(&mut c.provider_client_secret, "PROVIDER_CLIENT_SECRET");
        env_override(&mut c.provider_admin_uname, "PROVIDER_ADMIN_UNAME");
        env_override(&mut c.provider_admin_password, "PROVIDER_ADMIN_PASSWORD");
        env_override(&mut c.default_academic_year, "DEFAULT_ACADEMIC_YEAR");

        Ok(c)
    }

    pub fn db_connect_string(&self) -> String {
        format!(
            "host={} port={} user={} password='{}' dbname={}",
            &self.db_host, self.db_port, &self.db_user,
            &self.db_password, &self.db_name
        )
    }
}

/**
This guy hauls around the global state and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub provider: Provider,
    pub default_academic_year: String,
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
pub async fn load_configuration() -> Result<(Cfg, Glob), String> {
    let cfg = Cfg::load()?;
    log::info!("Configuration loaded:\n{:#?}", &cfg);

    log::trace!("Checking state of data DB...");
    let store = Store::new(cfg.db_connect_string());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    let provider = Provider::new(
        cfg.provider_url.clone(),
        cfg.provider_realm.clone(),
        cfg.provider_client_id.clone(),
        cfg.provider_client_secret.clone(),
        cfg.provider_admin_uname.clone(),
        cfg.provider_admin_password.clone(),
    );

    let glob = Glob {
        store,
        provider,
        default_academic_year: cfg.default_academic_year.clone(),
    };

    Ok((cfg, glob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Cfg::default();
        assert_eq!(c.addr.port(), 5000);
        assert_eq!(
            c.db_connect_string(),
            "host=localhost port=5432 user=postgres password='postgres' dbname=gradeview"
        );
        assert_eq!(c.default_academic_year, "2023-2024");
    }
}
