use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

/// Controls the popup must render.
const POPUP_SELECTORS: &[&str] = &[
    "#blockedCount",
    "#streamerInput",
    "#keywordInput",
    "#categorySearch",
    "#silentMode",
    "#blurMode",
];

pub struct E2eOptions {
    pub chromedriver_url: String,
    pub extension_path: String,
    pub headless: bool,
}

pub fn run_e2e(opts: E2eOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_e2e_async(opts))
}

fn chrome_args(extension_path: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--disable-extensions-except={}", extension_path.display()),
        format!("--load-extension={}", extension_path.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-default-apps".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

async fn run_e2e_async(opts: E2eOptions) -> Result<(), String> {
    let extension_path = canonicalize_path(&opts.extension_path)?;

    let mut caps = ChromeCapabilities::new();
    for arg in chrome_args(&extension_path, opts.headless) {
        caps.add_arg(&arg)
            .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    }

    let driver = WebDriver::new(&opts.chromedriver_url, caps)
        .await
        .map_err(|e| format!("Failed to connect to chromedriver: {}", e))?;

    let cdp = ChromeDevTools::new(driver.handle.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let extension_id = match find_extension_id(&cdp).await {
        Some(id) => id,
        None => {
            driver.quit().await.ok();
            return Err("Failed to locate extension service worker".to_string());
        }
    };
    log::info!("Extension loaded as {}", extension_id);

    let mut errors = Vec::new();

    let popup_url = format!("chrome-extension://{}/popup/popup.html", extension_id);
    if let Err(e) = driver.goto(&popup_url).await {
        errors.push(format!("Failed to open popup: {}", e));
    } else {
        for selector in POPUP_SELECTORS {
            if let Err(e) = driver.find(By::Css(*selector)).await {
                errors.push(format!("Popup is missing {}: {}", selector, e));
            }
        }
        if let Err(e) = check_blocked_count(&driver).await {
            errors.push(format!("Blocked count check failed: {}", e));
        }
    }

    driver.quit().await.ok();

    if errors.is_empty() {
        println!("✓ E2E checks passed");
        Ok(())
    } else {
        Err(format!("E2E failed:\n- {}", errors.join("\n- ")))
    }
}

async fn find_extension_id(cdp: &ChromeDevTools) -> Option<String> {
    let targets = cdp.execute_cdp("Target.getTargets").await.ok()?;
    let infos = targets.get("targetInfos")?.as_array()?;
    infos.iter().find_map(|info| {
        let target_type = info.get("type").and_then(Value::as_str).unwrap_or("");
        let url = info.get("url").and_then(Value::as_str).unwrap_or("");
        if !matches!(target_type, "service_worker" | "background_page") {
            return None;
        }
        extension_id_from_url(url)
    })
}

fn extension_id_from_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("chrome-extension://")?;
    rest.split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// A fresh profile starts with nothing blocked.
async fn check_blocked_count(driver: &WebDriver) -> Result<(), String> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    let result = driver
        .execute(
            "return document.getElementById('blockedCount')?.textContent ?? '';",
            Vec::<Value>::new(),
        )
        .await
        .map_err(|e| format!("Failed to read counter: {}", e))?;
    let text = result.json().as_str().unwrap_or("").trim().to_string();
    if text != "0" {
        return Err(format!("Expected 0 blocked items, popup shows '{}'", text));
    }
    Ok(())
}

fn canonicalize_path(path: &str) -> Result<PathBuf, String> {
    std::fs::canonicalize(path)
        .map_err(|e| format!("Failed to resolve '{}': {}", path, e))
}
