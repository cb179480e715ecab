//! First-run administrator.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use civitas_db::Database;
use civitas_db::models::NewAccount;
use civitas_db::queries::SeedOutcome;
use civitas_types::models::{MODERATOR_ROUTE, Role};

use crate::credentials::{CredentialHasher, generate_secret};

const GENERATED_PASSWORD_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub name: String,
    pub phone_number: String,
    pub email: String,
    /// `None` generates a password and writes it to `credential_file`.
    pub password: Option<String>,
    pub credential_file: PathBuf,
}

/// Create the administrator unless one already exists. Safe on every
/// startup; callers treat an error as a warning, not a reason to stop.
pub fn seed_admin(
    db: &Database,
    hasher: &dyn CredentialHasher,
    seed: &SeedAdmin,
) -> anyhow::Result<SeedOutcome> {
    if db.admin_exists()? {
        return Ok(SeedOutcome::AlreadyPresent);
    }

    let (password, generated) = match &seed.password {
        Some(password) => (password.clone(), false),
        None => (generate_secret(GENERATED_PASSWORD_LEN), true),
    };
    let password_hash = hasher.hash(&password)?;

    // A generated password must be on disk before the account exists.
    if generated {
        write_credential_file(seed, &password).with_context(|| {
            format!(
                "administrator password could not be written to {}; no administrator was created",
                seed.credential_file.display()
            )
        })?;
    }

    let seeded = db.ensure_seed_admin(&NewAccount {
        name: seed.name.clone(),
        phone_number: seed.phone_number.clone(),
        email: Some(seed.email.to_lowercase()),
        password_hash,
        address: None,
        department: None,
        position: Some(MODERATOR_ROUTE.to_string()),
        feedback_route: Some(MODERATOR_ROUTE.to_string()),
        role: Role::Authority,
        is_approved: true,
        is_admin: true,
    });
    let outcome = match seeded {
        Ok(outcome) => outcome,
        Err(e) => {
            if generated {
                discard_credential_file(seed);
            }
            return Err(e.into());
        }
    };

    match outcome {
        SeedOutcome::Created(id) => {
            info!("Seeded administrator account {} ({})", id, seed.email);
            if generated {
                warn!(
                    "Generated administrator password written to {}; sign in and remove the file",
                    seed.credential_file.display()
                );
            }
        }
        // Another process seeded first and this password was never used.
        SeedOutcome::AlreadyPresent if generated => discard_credential_file(seed),
        SeedOutcome::AlreadyPresent => {}
    }
    Ok(outcome)
}

fn discard_credential_file(seed: &SeedAdmin) {
    if let Err(e) = fs::remove_file(&seed.credential_file) {
        warn!(
            "Could not remove unused credential file {}: {}",
            seed.credential_file.display(),
            e
        );
    }
}

fn write_credential_file(seed: &SeedAdmin, password: &str) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&seed.credential_file)?;
    writeln!(file, "# civitas administrator, created {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(file, "phone_number={}", seed.phone_number)?;
    writeln!(file, "email={}", seed.email.to_lowercase())?;
    writeln!(file, "password={}", password)?;
    file.sync_all()
}
