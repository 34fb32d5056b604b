use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static KEY: Emoji<'_, '_> = Emoji("🔑 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

/// Shown once; the raw value is never recoverable afterwards.
pub fn print_secret(label: &str, secret: &str) {
    println!("  {} {}: {}", KEY, style(label).bold(), style(secret).yellow().bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

/// Prints rows as left-aligned columns sized to the widest cell.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<width$}", h, width = *w))
        .collect();
    println!("  {}", style(header_line.join("  ")).bold());
    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect();
        println!("  {}", line.join("  "));
    }
}

/// A titled block of `command  description` lines for help output.
pub struct GuideSection {
    title: String,
    commands: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn command(mut self, cmd: &str, desc: &str) -> Self {
        self.commands.push((cmd.to_string(), desc.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self.commands.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
        for (cmd, desc) in &self.commands {
            println!(
                "   {}  {}",
                style(format!("{:<width$}", cmd, width = width)).green(),
                style(desc).dim()
            );
        }
    }
}

pub fn print_banner() {
    println!();
    println!(
        " {} {}",
        style("openclaw").bold().cyan(),
        style("gateway").bold()
    );
    println!(
        " {}\n",
        style(format!(
            "Token-authenticated skill gateway v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
    );
}

pub fn print_goodbye() {
    println!("\n{}", style("Gateway stopped.").bold().cyan());
}
