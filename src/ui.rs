use console::{style, Term};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::{config::InstallConfig, error::InstallerError};

// ── Confirmation seam ─────────────────────────────────────────────────────────

/// Asks the operator before a destructive block of operations.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> Result<bool, InstallerError>;
}

/// Asks on the terminal. Defaults to "no".
#[derive(Debug, Default)]
pub struct Interactive;

impl Prompter for Interactive {
    fn confirm(&mut self, question: &str) -> Result<bool, InstallerError> {
        println!();
        Ok(Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()?)
    }
}

// ── Terminal helpers ──────────────────────────────────────────────────────────

fn term_width() -> usize {
    Term::stdout().size().1.max(60) as usize
}

fn rule() -> String {
    "─".repeat(term_width().min(60))
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    let logo = [
        r"    ██████╗ ███████╗███╗   ██╗████████╗ ██████╗  ██████╗ ",
        r"   ██╔════╝ ██╔════╝████╗  ██║╚══██╔══╝██╔═══██╗██╔═══██╗",
        r"   ██║  ███╗█████╗  ██╔██╗ ██║   ██║   ██║   ██║██║   ██║",
        r"   ██║   ██║██╔══╝  ██║╚██╗██║   ██║   ██║   ██║██║   ██║",
        r"   ╚██████╔╝███████╗██║ ╚████║   ██║   ╚██████╔╝╚██████╔╝",
        r"    ╚═════╝ ╚══════╝╚═╝  ╚═══╝   ╚═╝    ╚═════╝  ╚═════╝ ",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).magenta().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   Guided Installer  ·  stage3 + Portage  ·  v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    println!("{}", style(rule()).dim());
    println!();
}

// ── Step header ───────────────────────────────────────────────────────────────

/// Prints a visually distinct numbered step header.
pub fn print_step(step: usize, total: usize, title: &str) {
    println!();
    let tag = style(format!(" {}/{} ", step, total)).black().on_magenta().bold();
    let heading = style(format!("  {}", title)).white().bold();
    println!("{}{}", tag, heading);
    println!("{}", style(rule()).dim());
}

// ── Feedback messages ─────────────────────────────────────────────────────────

/// Green ✓: operation completed successfully.
pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

/// Blue →: neutral info / progress note.
pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

/// Yellow ⚠: non-fatal notice.
pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Red ✗: error (written to stderr).
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Renders a bordered key→value box in the terminal.
///
/// ```text
/// ┌─ Installation summary ─────────────────────┐
/// │  Disk           /dev/nvme0n1 (auto)
/// │  Hostname       gentoo
/// └────────────────────────────────────────────┘
/// ```
pub fn print_kv_box(title: &str, rows: &[(&str, String)]) {
    const BOX_INNER: usize = 44;

    let dashes = "─".repeat(BOX_INNER.saturating_sub(title.chars().count() + 2));
    println!(
        "  ┌─ {} {}┐",
        style(title).white().bold(),
        style(&dashes).dim()
    );

    for (key, val) in rows {
        println!(
            "  │  {:<16}{}",
            style(*key).dim(),
            style(val).white().bold()
        );
    }

    println!("  └{}┘", style("─".repeat(BOX_INNER + 2)).dim());
}

fn or_unset(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "—".to_string())
}

/// The box shown right before the operator starts the installation.
pub fn print_summary(config: &InstallConfig) {
    let disk = match config.disk_mode {
        crate::config::DiskMode::Auto => format!("{} (wipe)", or_unset(&config.target_disk)),
        crate::config::DiskMode::Manual => format!(
            "root {} · boot {}",
            or_unset(&config.root_partition),
            or_unset(&config.boot_partition)
        ),
    };
    let boot_mode = match config.use_uefi {
        Some(true) => "UEFI",
        Some(false) => "BIOS",
        None => "—",
    };
    let set = |pw: bool| if pw { "set" } else { "not set" }.to_string();

    print_kv_box(
        "Installation summary",
        &[
            ("Language", config.language.clone()),
            ("Stage3", or_unset(&config.stage3_source)),
            ("Disk", disk),
            ("Swap", or_unset(&config.swap_partition)),
            ("Root FS", config.root_fs.clone()),
            ("Boot mode", boot_mode.to_string()),
            ("Hostname", or_unset(&config.hostname)),
            ("User", or_unset(&config.username)),
            ("Sudo", if config.user_is_sudoer { "yes" } else { "no" }.to_string()),
            ("Root password", set(config.root_password.is_some())),
            ("User password", set(config.user_password.is_some())),
            ("Desktop", or_unset(&config.desktop_profile)),
            ("Bootloader", config.bootloader.clone()),
            ("Kernel", config.kernel.clone()),
            ("Network", config.network_mode.clone()),
        ],
    );
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner.
/// Call `pb.finish_and_clear()` when done.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("  {spinner:.magenta.bold}  {msg}") {
        pb.set_style(
            template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
