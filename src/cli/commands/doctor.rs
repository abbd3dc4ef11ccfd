use console::style;

use crate::cli::Context;
use crate::doctor;
use crate::error::Result;

pub async fn execute(ctx: &Context) -> Result<()> {
    let checks = doctor::run(&ctx.paths);

    if ctx.json {
        return super::print_json(&checks);
    }

    println!("{}", style("fdev doctor").bold().cyan());
    println!();
    for check in &checks {
        if check.ok {
            println!("  {} {}", style("✓").green().bold(), check.name);
        } else {
            println!("  {} {}", style("✗").red().bold(), check.name);
            println!("    {}", style(&check.message).dim());
        }
    }

    let failed = checks.iter().filter(|c| !c.ok).count();
    println!();
    if failed == 0 {
        println!("{}", style("All checks passed.").green());
    } else {
        println!("{}", style(format!("{} check(s) need attention.", failed)).yellow());
    }

    Ok(())
}
