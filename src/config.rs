use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_image_model: String,
    pub gemini_analysis_model: String,
    pub gemini_timeout_seconds: u64,
    pub telegram_bot_token: String,
    pub telegram_admin_chat_id: String,
    pub session_dir: PathBuf,
    pub export_dir: PathBuf,
    pub watermark_text: String,
    pub watermark_font_path: Option<PathBuf>,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(name, default))
}

/// Finds a usable watermark font. `WATERMARK_FONT_PATH` wins when set;
/// otherwise common system font locations are probed in order.
fn resolve_watermark_font_path() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(env_value) = env::var("WATERMARK_FONT_PATH") {
        let env_path = PathBuf::from(env_value);
        if env_path.is_absolute() {
            candidates.push(env_path);
        } else {
            candidates.push(
                env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(env_path),
            );
        }
    }
    candidates.push(PathBuf::from(
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    ));
    candidates.push(PathBuf::from(
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ));
    candidates.push(PathBuf::from(
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    ));
    candidates.push(PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("/Library/Fonts/Arial.ttf"));
    candidates.push(PathBuf::from("C:\\Windows\\Fonts\\arialbd.ttf"));

    candidates.into_iter().find(|candidate| candidate.exists())
}

impl Config {
    pub fn load() -> Result<Self> {
        // GEMINI_API_KEY is deliberately not required here; its absence
        // fails at the first call into the generation client so that
        // offline commands (login, export) keep working.
        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_analysis_model: env_string("GEMINI_ANALYSIS_MODEL", "gemini-3-flash-preview"),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90),
            telegram_bot_token: env_string("TELEGRAM_BOT_TOKEN", ""),
            telegram_admin_chat_id: env_string("TELEGRAM_ADMIN_CHAT_ID", ""),
            session_dir: env_path("SESSION_DIR", ".studio"),
            export_dir: env_path("EXPORT_DIR", "."),
            watermark_text: env_string("WATERMARK_TEXT", "© AI PRODUCT STUDIO"),
            watermark_font_path: resolve_watermark_font_path(),
        })
    }
}
