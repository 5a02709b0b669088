//! Automation-hiding measures for stealth pages
//!
//! Scripts are registered with `Page.addScriptToEvaluateOnNewDocument`, so
//! they must be injected on a blank page before navigating to the target.

use anyhow::Result;
use chromiumoxide::{Page, cdp};
use futures::future::join_all;
use tracing::{debug, warn};

mod profile;
mod scripts;

pub use profile::StealthProfile;

/// Register every evasion script and drop "Headless" from the user agent.
///
/// Individual script failures are logged; only a total failure is an error.
pub async fn inject(page: &Page, profile: &StealthProfile) -> Result<()> {
    let seed: [u8; 16] = rand::random();
    let bootstrap = profile.bootstrap_script(&hex::encode(seed));

    // The bootstrap must land before the scripts that read it
    add_script(page, bootstrap).await?;

    let results = join_all(scripts::EVASIONS.iter().map(|(name, source)| async move {
        (*name, add_script(page, (*source).to_string()).await)
    }))
    .await;

    let mut injected = 0usize;
    for (name, result) in results {
        match result {
            Ok(()) => injected += 1,
            Err(e) => warn!("Failed to inject evasion {name}: {e}"),
        }
    }
    if injected == 0 {
        anyhow::bail!("Failed to inject any stealth scripts");
    }

    let version = page
        .execute(cdp::browser_protocol::browser::GetVersionParams {})
        .await?;
    let user_agent = version.user_agent.replace("HeadlessChrome", "Chrome");

    page.execute(cdp::browser_protocol::network::SetUserAgentOverrideParams {
        user_agent,
        accept_language: Some(profile.accept_language.clone()),
        platform: Some(profile.platform.clone()),
        user_agent_metadata: None,
    })
    .await?;

    debug!("Stealth injection complete: {injected}/{} evasions", scripts::EVASIONS.len());
    Ok(())
}

async fn add_script(page: &Page, source: String) -> Result<()> {
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source,
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await?;
    Ok(())
}
