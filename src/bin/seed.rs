/*!
Populating a fresh database with a starter subject catalog so there is
something to experiment against.

Subjects only: users (admins, teachers, students) are provisioned through
the identity provider and the regular API, and the tables hanging off
them fill up once real users exist.
*/
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use gradeview::config::Cfg;
use gradeview::store::Store;
use gradeview::subject::NewSubject;

static CATALOG: &[(&str, &str, &str, i32)] = &[
    ("Mathematics", "MATH101", "Single-variable calculus and linear algebra.", 4),
    ("Physics", "PHYS110", "Mechanics, waves, and thermodynamics.", 4),
    ("Chemistry", "CHEM100", "General chemistry with laboratory work.", 3),
    ("Literature", "LIT200", "Survey of world literature.", 2),
    ("History", "HIST150", "", 2),
    ("Computer Science", "CS101", "Programming fundamentals.", 3),
    ("English", "ENG105", "Academic writing and composition.", 2),
    ("Biology", "BIO120", "Cell biology and genetics.", 3),
];

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("gradeview")
        .build();
    TermLogger::init(
        gradeview::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();

    let cfg = match Cfg::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("Error loading configuration: {}", &e);
            std::process::exit(1);
        },
    };

    let db = Store::new(cfg.db_connect_string());
    if let Err(e) = db.ensure_db_schema().await {
        log::error!("Unable to ensure state of data DB: {}", &e);
        std::process::exit(1);
    }

    match db.get_subjects().await {
        Err(e) => {
            log::error!("Unable to inspect existing catalog: {}", &e);
            std::process::exit(1);
        },
        Ok(existing) if !existing.is_empty() => {
            log::warn!(
                "Database already holds {} subject(s); refusing to reseed.",
                existing.len()
            );
            std::process::exit(1);
        },
        Ok(_) => {},
    }

    let catalog: Vec<NewSubject> = CATALOG.iter()
        .map(|(name, code, description, credits)| NewSubject {
            name: name.to_string(),
            code: code.to_string(),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            credits: *credits,
        }).collect();

    match db.insert_subjects(&catalog).await {
        Ok(n) => {
            log::info!("Seeded {} subjects.", n);
            println!("Seeded {} subjects.", n);
        },
        Err(e) => {
            log::error!("Error seeding subject catalog: {}", &e);
            std::process::exit(1);
        },
    }
}
