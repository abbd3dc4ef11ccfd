use console::style;

use crate::cli::Context;
use crate::error::Result;

pub async fn show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;

    if ctx.json {
        return super::print_json(config);
    }

    let config_path = ctx.paths.config_file();

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    println!("  Backups kept: {}", style(config.backup_keep).yellow());
    println!("  Key type:     {}", style(&config.default_key_type).white());
    println!(
        "  SSH config:   {}",
        style(ctx.paths.ssh_config().display()).white()
    );
    println!("  Keys:         {}", style(ctx.paths.keys.display()).dim());
    println!("  Backups:      {}", style(ctx.paths.backups.display()).dim());
    println!();
    if config_path.exists() {
        println!("Config file: {}", style(config_path.display()).dim());
    } else {
        println!(
            "{}",
            style("No config file yet; showing defaults.").dim()
        );
    }

    Ok(())
}

pub async fn set(ctx: Context, key: String, value: String) -> Result<()> {
    let mut config = ctx.config;

    if !config.set(&key, &value)? {
        println!(
            "{} Unknown config key: {}",
            style("!").yellow().bold(),
            style(&key).red()
        );
        println!("\nAvailable keys:");
        println!("  backup_keep, default_key_type, ssh_config");
        return Ok(());
    }

    ctx.paths.ensure_directories()?;
    config.save(&ctx.paths)?;

    println!(
        "{} Set {} = {}",
        style("✓").green().bold(),
        style(&key).cyan(),
        style(&value).white()
    );

    Ok(())
}

pub async fn path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.paths.config_file().display());
    Ok(())
}
