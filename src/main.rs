use std::path::PathBuf;

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod export;
mod gemini;
mod image_file;
mod notify;
mod options;
mod prompt;
mod session;
mod studio;
mod utils;

use config::CONFIG;
use export::ExportTier;
use image_file::ImageFile;
use options::{CameraPerspective, LightingStyle, SceneOptions};
use session::{FileSessionStore, SessionGate};
use studio::Studio;
use utils::logging::init_logging;

fn usage() -> &'static str {
    "Usage:\n  \
product-photo-studio login --name <name> --email <email> [--phone <number>]\n  \
product-photo-studio logout\n  \
product-photo-studio whoami\n  \
product-photo-studio shoot --product <path> [--style <path>] [--lighting <key>]\n                             \
[--perspective <key>] [--tier standard|ultra] [--out <dir>]\n                             \
[--prompt <text>] [--dry-run]\n  \
product-photo-studio export --image <path> [--tier standard|ultra] [--out <dir>]"
}

#[derive(Debug)]
struct LoginArgs {
    name: String,
    email: String,
    phone: Option<String>,
}

#[derive(Debug)]
struct ShootArgs {
    product: PathBuf,
    style: Option<PathBuf>,
    options: SceneOptions,
    tier: ExportTier,
    out_dir: PathBuf,
    prompt_override: Option<String>,
    dry_run: bool,
}

#[derive(Debug)]
struct ExportArgs {
    image: PathBuf,
    tier: ExportTier,
    out_dir: PathBuf,
}

#[derive(Debug)]
enum CliCommand {
    Login(LoginArgs),
    Logout,
    Whoami,
    Shoot(ShootArgs),
    Export(ExportArgs),
}

fn flag_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_login_args(args: &[String]) -> Result<LoginArgs> {
    let mut name = None;
    let mut email = None;
    let mut phone = None;

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--name" => name = Some(flag_value(args, &mut index, "--name")?.to_string()),
            "--email" => email = Some(flag_value(args, &mut index, "--email")?.to_string()),
            "--phone" => phone = Some(flag_value(args, &mut index, "--phone")?.to_string()),
            other => return Err(anyhow!("Unknown login argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    Ok(LoginArgs {
        name: name.ok_or_else(|| anyhow!("--name is required"))?,
        email: email.ok_or_else(|| anyhow!("--email is required"))?,
        phone,
    })
}

fn parse_shoot_args(args: &[String]) -> Result<ShootArgs> {
    let mut product = None;
    let mut style = None;
    let mut options = SceneOptions::default();
    let mut tier = ExportTier::Standard;
    let mut out_dir = CONFIG.export_dir.clone();
    let mut prompt_override = None;
    let mut dry_run = false;

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--product" => {
                product = Some(PathBuf::from(flag_value(args, &mut index, "--product")?))
            }
            "--style" => style = Some(PathBuf::from(flag_value(args, &mut index, "--style")?)),
            "--lighting" => {
                options.lighting = LightingStyle::parse(flag_value(args, &mut index, "--lighting")?)?
            }
            "--perspective" => {
                options.perspective =
                    CameraPerspective::parse(flag_value(args, &mut index, "--perspective")?)?
            }
            "--tier" => tier = ExportTier::parse(flag_value(args, &mut index, "--tier")?)?,
            "--out" => out_dir = PathBuf::from(flag_value(args, &mut index, "--out")?),
            "--prompt" => {
                prompt_override = Some(flag_value(args, &mut index, "--prompt")?.to_string())
            }
            "--dry-run" => dry_run = true,
            other => return Err(anyhow!("Unknown shoot argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    Ok(ShootArgs {
        product: product.ok_or_else(|| anyhow!("--product is required"))?,
        style,
        options,
        tier,
        out_dir,
        prompt_override,
        dry_run,
    })
}

fn parse_export_args(args: &[String]) -> Result<ExportArgs> {
    let mut image = None;
    let mut tier = ExportTier::Standard;
    let mut out_dir = CONFIG.export_dir.clone();

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => image = Some(PathBuf::from(flag_value(args, &mut index, "--image")?)),
            "--tier" => tier = ExportTier::parse(flag_value(args, &mut index, "--tier")?)?,
            "--out" => out_dir = PathBuf::from(flag_value(args, &mut index, "--out")?),
            other => return Err(anyhow!("Unknown export argument: {other}\n{}", usage())),
        }
        index += 1;
    }

    Ok(ExportArgs {
        image: image.ok_or_else(|| anyhow!("--image is required"))?,
        tier,
        out_dir,
    })
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    let command = args.get(1).map(|value| value.as_str());
    let rest: &[String] = if args.len() > 2 { &args[2..] } else { &[] };

    match command {
        Some("login") => Ok(CliCommand::Login(parse_login_args(rest)?)),
        Some("logout") => Ok(CliCommand::Logout),
        Some("whoami") => Ok(CliCommand::Whoami),
        Some("shoot") => Ok(CliCommand::Shoot(parse_shoot_args(rest)?)),
        Some("export") => Ok(CliCommand::Export(parse_export_args(rest)?)),
        Some("--help") | Some("-h") | None => Err(anyhow!(usage())),
        Some(other) => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

fn open_gate() -> SessionGate<FileSessionStore> {
    SessionGate::open(FileSessionStore::new(CONFIG.session_dir.clone()))
}

async fn run_login(args: LoginArgs) -> Result<()> {
    let mut gate = open_gate();
    let identity = gate.login(&args.name, &args.email)?;

    if !CONFIG.telegram_admin_chat_id.trim().is_empty() {
        if let Err(err) = gate.remember_routing_id(&CONFIG.telegram_admin_chat_id) {
            warn!("Failed to persist notification routing id: {err}");
        }
    }

    // Detached best-effort notification; login has already succeeded
    // and does not depend on the outcome.
    let routing_id = gate.routing_id();
    let phone = args.phone.clone();
    let notified = tokio::spawn(async move {
        notify::send_login_notification(&identity, phone.as_deref(), routing_id).await;
    });
    let _ = notified.await;

    println!("Logged in as {} <{}>.", args.name.trim(), args.email.trim());
    Ok(())
}

fn run_logout() -> Result<()> {
    let mut gate = open_gate();
    gate.logout()?;
    println!("Logged out.");
    Ok(())
}

fn run_whoami() -> Result<()> {
    let gate = open_gate();
    match gate.current() {
        Some(identity) => println!("{} <{}> (verified)", identity.name, identity.email),
        None => println!("Not logged in. Run `product-photo-studio login` first."),
    }
    Ok(())
}

async fn run_shoot(args: ShootArgs) -> Result<()> {
    let gate = open_gate();
    if !gate.is_verified() {
        return Err(anyhow!(
            "Not logged in. Run `product-photo-studio login` first."
        ));
    }

    let mut studio = Studio::new();
    studio.set_options(args.options);

    let product = ImageFile::from_path(&args.product).await?;
    info!(
        "Loaded product image {} ({}, {} bytes)",
        product.display_name,
        product.mime_type,
        product.bytes.len()
    );
    studio.set_product_image(product);

    if let Some(style_path) = &args.style {
        let style = ImageFile::from_path(style_path).await?;
        info!("Loaded style reference {}", style.display_name);
        let ticket = studio.set_style_image(style);

        println!("Analyzing style reference...");
        let outcome = gemini::analyze_style(&ticket.image).await;
        let failed = outcome.is_err();
        studio.apply_analysis(ticket.token, outcome);
        if failed {
            eprintln!("Style analysis failed; falling back to the generic style clause.");
        }
    }

    if let Some(text) = args.prompt_override {
        studio.override_prompt(text);
    }

    println!("\n--- Prompt ---\n{}\n--------------\n", studio.prompt());
    if args.dry_run {
        return Ok(());
    }

    let (token, request) = studio.begin_generation()?;
    println!("Generating with {}...", CONFIG.gemini_image_model);
    let result =
        gemini::generate_image(&request.product, &request.prompt, request.style.as_ref()).await;
    let failure = result.as_ref().err().map(|err| err.to_string());
    studio.complete_generation(token, result);

    if let Some(message) = failure {
        return Err(anyhow!(message));
    }

    let generated = studio
        .generated_image()
        .cloned()
        .ok_or_else(|| anyhow!("The generation service returned no image."))?;

    if studio.begin_export() {
        match export::export_image(&generated, args.tier, &args.out_dir) {
            Ok(path) => println!("Saved {}", path.display()),
            // Swallowed: the render succeeded, only the file export
            // failed; the flag reset keeps the control usable.
            Err(err) => error!("Export failed: {err:#}"),
        }
        studio.finish_export();
    }

    Ok(())
}

async fn run_export(args: ExportArgs) -> Result<()> {
    let image = ImageFile::from_path(&args.image).await?;
    match export::export_image(&image, args.tier, &args.out_dir) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(err) => error!("Export failed: {err:#}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let result = match command {
        CliCommand::Login(args) => run_login(args).await,
        CliCommand::Logout => run_logout(),
        CliCommand::Whoami => run_whoami(),
        CliCommand::Shoot(args) => run_shoot(args).await,
        CliCommand::Export(args) => run_export(args).await,
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("product-photo-studio")
            .chain(values.iter().copied())
            .map(|value| value.to_string())
            .collect()
    }

    #[test]
    fn parses_a_full_shoot_command() {
        let parsed = parse_args(&args(&[
            "shoot",
            "--product",
            "lamp.png",
            "--style",
            "moodboard.jpg",
            "--lighting",
            "golden-hour",
            "--perspective",
            "macro",
            "--tier",
            "ultra",
            "--dry-run",
        ]))
        .unwrap();

        let CliCommand::Shoot(shoot) = parsed else {
            panic!("expected a shoot command");
        };
        assert_eq!(shoot.product, PathBuf::from("lamp.png"));
        assert_eq!(shoot.style, Some(PathBuf::from("moodboard.jpg")));
        assert_eq!(shoot.options.lighting, LightingStyle::GoldenHour);
        assert_eq!(shoot.options.perspective, CameraPerspective::Macro);
        assert_eq!(shoot.tier, ExportTier::Ultra);
        assert!(shoot.dry_run);
    }

    #[test]
    fn shoot_requires_a_product_image() {
        let err = parse_args(&args(&["shoot", "--tier", "standard"])).unwrap_err();
        assert!(err.to_string().contains("--product"));
    }

    #[test]
    fn login_requires_name_and_email_flags() {
        assert!(parse_args(&args(&["login", "--name", "Lina"])).is_err());
        let parsed =
            parse_args(&args(&["login", "--name", "Lina", "--email", "l@e.co"])).unwrap();
        assert!(matches!(parsed, CliCommand::Login(_)));
    }

    #[test]
    fn unknown_commands_point_at_the_usage_text() {
        let err = parse_args(&args(&["paint"])).unwrap_err();
        assert!(err.to_string().contains("Usage:"));
    }
}
