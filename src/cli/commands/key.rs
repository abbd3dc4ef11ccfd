use std::path::PathBuf;

use console::style;
use dialoguer::{Confirm, Password};

use crate::cli::Context;
use crate::error::{FdevError, Result};
use crate::ssh::import::detect_key_type;
use crate::ssh::keys::key_fingerprint;
use crate::ssh::{regenerate_public_key, scan_foreign_keys, KeyAlgorithm, KeyMaterial, KeySpec, KeyStore};

fn prompt_passphrase(confirm: bool) -> Result<String> {
    let mut prompt = Password::new().with_prompt("Passphrase (empty for none)");
    if confirm {
        prompt = prompt.with_confirmation("Confirm passphrase", "Passphrases don't match");
    }
    Ok(prompt.allow_empty_password(true).interact()?)
}

fn print_material(material: &KeyMaterial) {
    let size = if material.bits > 0 {
        format!("{} bits", material.bits)
    } else {
        "-".to_string()
    };

    println!("  {}   {}", style("Alias").dim(), style(&material.alias).cyan());
    println!("  {}    {} ({})", style("Type").dim(), material.algorithm, size);
    println!(
        "  {} {}",
        style("Private").dim(),
        material.private_key_path.display()
    );
    println!(
        "  {}  {}",
        style("Public").dim(),
        material.public_key_path.display()
    );
    if material.protected {
        println!("  {}", style("Passphrase protected").yellow());
    }
    if let Ok(fingerprint) = key_fingerprint(&material.public_key_path) {
        println!("  {}  {}", style("SHA256").dim(), style(fingerprint).dim());
    }
}

/// Run key generation on the blocking pool; RSA in particular takes a while.
async fn generate_blocking(
    ctx: &Context,
    alias: &str,
    comment: &str,
    spec: KeySpec,
    passphrase: Option<String>,
    force: bool,
) -> Result<KeyMaterial> {
    let paths = ctx.paths.clone();
    let alias = alias.to_string();
    let comment = comment.to_string();

    tokio::task::spawn_blocking(move || {
        let store = KeyStore::new(&paths);
        if force {
            store.force_generate(&alias, &comment, spec, passphrase.as_deref())
        } else {
            store.generate(&alias, &comment, spec, passphrase.as_deref())
        }
    })
    .await
    .map_err(|e| FdevError::Other(anyhow::Error::new(e)))?
}

pub async fn generate(
    ctx: &Context,
    alias: String,
    key_type: Option<String>,
    bits: u32,
    comment: Option<String>,
    passphrase: bool,
    force: bool,
) -> Result<()> {
    let algorithm = match key_type {
        Some(key_type) => key_type.parse::<KeyAlgorithm>()?,
        None => ctx.config.key_algorithm()?,
    };
    let spec = KeySpec::new(algorithm, bits)?;
    let comment = comment.unwrap_or_else(|| alias.clone());
    ctx.paths.ensure_directories()?;

    let passphrase = if passphrase {
        Some(prompt_passphrase(true)?).filter(|p| !p.is_empty())
    } else {
        None
    };

    if !ctx.json {
        println!(
            "{} Generating {} key for {}...",
            style("→").cyan().bold(),
            algorithm,
            style(&alias).cyan()
        );
    }

    let material = match generate_blocking(ctx, &alias, &comment, spec, passphrase.clone(), force).await
    {
        Ok(material) => material,
        Err(e) if e.is_key_exists() => {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "  {} {} Overwrite it?",
                    style("?").cyan().bold(),
                    e
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("  {}", style("Cancelled.").dim());
                return Ok(());
            }

            generate_blocking(ctx, &alias, &comment, spec, passphrase, true).await?
        }
        Err(e) => return Err(e),
    };

    if ctx.json {
        return super::print_json(&material);
    }

    println!("{} Key pair created", style("✓").green().bold());
    println!();
    print_material(&material);

    Ok(())
}

pub async fn regen(
    ctx: &Context,
    alias: String,
    key_type: Option<String>,
    passphrase: bool,
) -> Result<()> {
    let store = KeyStore::new(&ctx.paths);
    let algorithm = match key_type {
        Some(key_type) => key_type.parse::<KeyAlgorithm>()?,
        None => store.existing_algorithm(&alias)?.ok_or_else(|| {
            FdevError::validation("alias", format!("no key pair stored for '{}'", alias))
        })?,
    };

    let private_path = ctx.paths.private_key(&alias, algorithm)?;
    let public_path = ctx.paths.public_key(&alias, algorithm)?;

    let bytes = std::fs::read(&private_path).map_err(FdevError::io("read", &private_path))?;
    let protected = detect_key_type(&bytes).protected;

    let passphrase = if passphrase || protected {
        Some(prompt_passphrase(false)?)
    } else {
        None
    };

    regenerate_public_key(&private_path, &public_path, passphrase.as_deref())?;

    if ctx.json {
        return super::print_json(&serde_json::json!({
            "alias": alias,
            "public_key_path": public_path,
        }));
    }

    println!(
        "{} Public key rewritten at {}",
        style("✓").green().bold(),
        style(public_path.display()).cyan()
    );

    Ok(())
}

pub async fn scan(ctx: &Context, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| ctx.paths.ssh_dir().to_path_buf());
    let found = scan_foreign_keys(&dir)?;

    if ctx.json {
        return super::print_json(&found);
    }

    if found.is_empty() {
        println!(
            "{}",
            style(format!("No key pairs found in {}", dir.display())).dim()
        );
        return Ok(());
    }

    println!(
        "{} {}",
        style("Key pairs").bold().cyan(),
        style(dir.display()).dim()
    );
    println!();
    for key in &found {
        let algorithm = key
            .algorithm
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let bits = if key.bits > 0 {
            key.bits.to_string()
        } else {
            "-".to_string()
        };
        let protected = if key.protected {
            style("protected").yellow()
        } else {
            style("").dim()
        };
        println!(
            "  {:<24} {:<8} {:>5}  {}",
            style(&key.name).white().bold(),
            algorithm,
            bits,
            protected
        );
    }
    println!();
    println!(
        "Import one with {}",
        style("fdev key import <NAME> [--alias ALIAS]").cyan()
    );

    Ok(())
}

pub async fn import(
    ctx: &Context,
    name: String,
    dir: Option<PathBuf>,
    alias: Option<String>,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| ctx.paths.ssh_dir().to_path_buf());
    ctx.paths.ensure_directories()?;

    let candidate = scan_foreign_keys(&dir)?
        .into_iter()
        .find(|k| k.name == name)
        .ok_or_else(|| {
            FdevError::validation(
                "name",
                format!(
                    "no key pair named '{}' (with a .pub sibling) in {}",
                    name,
                    dir.display()
                ),
            )
        })?;

    let material = KeyStore::new(&ctx.paths).import_foreign_key(&candidate, alias.as_deref())?;

    if ctx.json {
        return super::print_json(&material);
    }

    println!("{} Imported {}", style("✓").green().bold(), style(&name).cyan());
    println!();
    print_material(&material);

    Ok(())
}
