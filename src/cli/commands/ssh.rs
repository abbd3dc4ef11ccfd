use console::style;
use dialoguer::Confirm;

use crate::cli::{Context, IdentityArgs};
use crate::error::Result;
use crate::ssh::backup::{backup_prefix, list_backups};
use crate::ssh::parser::{importable_hosts, parse};
use crate::ssh::{self, DiffKind, DiffLine, DiffSummary, Identity, KeyAlgorithm, KeyRef, KeyStore};

impl IdentityArgs {
    /// Build the identity, resolving a managed key's algorithm from disk when
    /// not given explicitly.
    pub fn resolve(self, ctx: &Context) -> Result<Identity> {
        let key = match (self.key, self.key_alias) {
            (Some(path), _) => KeyRef::Path(path),
            (None, Some(key_alias)) => {
                let algorithm = match self.key_type {
                    Some(key_type) => key_type.parse::<KeyAlgorithm>()?,
                    None => match KeyStore::new(&ctx.paths).existing_algorithm(&key_alias)? {
                        Some(algorithm) => algorithm,
                        None => ctx.config.key_algorithm()?,
                    },
                };
                KeyRef::Store {
                    alias: key_alias,
                    algorithm,
                }
            }
            (None, None) => KeyRef::Store {
                alias: self.alias.clone(),
                algorithm: ctx.config.key_algorithm()?,
            },
        };

        let identity = Identity::new(self.alias, self.hostname, key);
        identity.validate()?;
        Ok(identity)
    }
}

fn print_diff(lines: &[DiffLine]) {
    for line in lines {
        match line.kind {
            DiffKind::Added => println!("  {}", style(format!("+ {}", line.text)).green()),
            DiffKind::Removed => println!("  {}", style(format!("- {}", line.text)).red()),
            DiffKind::Unchanged => println!("  {}", style(format!("  {}", line.text)).dim()),
        }
    }
}

fn print_summary(summary: &DiffSummary) {
    println!(
        "  {} {}  {} {}",
        style(summary.added).green().bold(),
        style("added").dim(),
        style(summary.removed).red().bold(),
        style("removed").dim()
    );
}

fn warn_missing_key(ctx: &Context, identity: &Identity) -> Result<()> {
    let key_path = identity.key_path(&ctx.paths)?;
    if !key_path.exists() {
        println!(
            "  {} Key {} does not exist yet",
            style("!").yellow().bold(),
            style(key_path.display()).yellow()
        );
    }
    Ok(())
}

pub async fn preview(ctx: &Context, args: IdentityArgs) -> Result<()> {
    let identity = args.resolve(ctx)?;
    let lines = ssh::preview_apply(&ctx.paths, &identity)?;

    if ctx.json {
        return super::print_json(&lines);
    }

    let summary = DiffSummary::of(&lines);
    println!(
        "{} {}",
        style("Preview").bold().cyan(),
        style(ctx.paths.ssh_config().display()).dim()
    );
    println!();
    if summary.is_noop() {
        println!("  {}", style("No changes.").dim());
        return Ok(());
    }

    print_diff(&lines);
    println!();
    print_summary(&summary);
    warn_missing_key(ctx, &identity)?;

    Ok(())
}

pub async fn apply(ctx: &Context, args: IdentityArgs, yes: bool) -> Result<()> {
    let identity = args.resolve(ctx)?;

    let lines = ssh::preview_apply(&ctx.paths, &identity)?;
    let summary = DiffSummary::of(&lines);

    if !ctx.json {
        if summary.is_noop() {
            println!(
                "{} {} is already up to date",
                style("✓").green().bold(),
                style(ctx.paths.ssh_config().display()).cyan()
            );
            return Ok(());
        }

        print_diff(&lines);
        println!();
        print_summary(&summary);
        warn_missing_key(ctx, &identity)?;
        println!();
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "  {} Write these changes to {}?",
                style("?").cyan().bold(),
                ctx.paths.ssh_config().display()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  {}", style("Cancelled.").dim());
            return Ok(());
        }
    }

    ctx.paths.ensure_directories()?;
    let outcome = ssh::apply(&ctx.paths, &identity, ctx.config.backup_keep)?;

    if ctx.json {
        return super::print_json(&outcome);
    }

    if let Some(backup) = &outcome.backup {
        println!(
            "  {} Backup saved to {}",
            style("✓").green().bold(),
            style(backup.display()).dim()
        );
    }
    println!(
        "  {} Applied {} to {}",
        style("✓").green().bold(),
        style(&identity.alias).cyan(),
        style(outcome.config_path.display()).white()
    );

    Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
    let parsed = parse(ctx.paths.ssh_config())?;

    if ctx.json {
        return super::print_json(&parsed.blocks);
    }

    if parsed.blocks.is_empty() {
        println!("{}", style("No Host blocks found.").dim());
        return Ok(());
    }

    println!(
        "{} {}",
        style("Host blocks").bold().cyan(),
        style(ctx.paths.ssh_config().display()).dim()
    );
    println!();
    for block in &parsed.blocks {
        let marker = if block.is_managed {
            style("managed").green()
        } else {
            style("manual").dim()
        };
        let hostname = block.option("HostName").unwrap_or("-");
        println!(
            "  {:<24} {:<32} {}",
            style(&block.host_alias).white().bold(),
            hostname,
            marker
        );
    }

    Ok(())
}

pub async fn importable(ctx: &Context) -> Result<()> {
    let hosts = importable_hosts(ctx.paths.ssh_config())?;

    if ctx.json {
        return super::print_json(&hosts);
    }

    if hosts.is_empty() {
        println!("{}", style("No hand-written Host blocks found.").dim());
        return Ok(());
    }

    for host in &hosts {
        println!("  {}", style(&host.host_alias).white().bold());
        println!(
            "    {}  {}",
            style("HostName    ").dim(),
            host.hostname.as_deref().unwrap_or("-")
        );
        println!(
            "    {}  {}",
            style("User        ").dim(),
            host.user.as_deref().unwrap_or("-")
        );
        println!(
            "    {}  {}",
            style("IdentityFile").dim(),
            host.identity_file.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

pub async fn backups(ctx: &Context) -> Result<()> {
    let backups = list_backups(&ctx.paths.backups, &backup_prefix(ctx.paths.ssh_config()))?;

    if ctx.json {
        return super::print_json(&backups);
    }

    if backups.is_empty() {
        println!("{}", style("No backups yet.").dim());
        return Ok(());
    }

    println!(
        "{} {}",
        style("Backups").bold().cyan(),
        style(format!("(keeping {})", ctx.config.backup_keep)).dim()
    );
    // Newest first
    for backup in backups.iter().rev() {
        println!("  {}", backup.display());
    }

    Ok(())
}
