//! Scripted page interactions run after the page settles

use anyhow::{Context, Result};
use chromiumoxide::Page;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::stabilize::wait_for_selector;
use crate::config::PageAction;

const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Pause after a click so handlers and transitions can run
const AFTER_CLICK: Duration = Duration::from_millis(300);

/// Execute `actions` in order, stopping at the first failure
pub(crate) async fn run_actions(page: &Page, actions: &[PageAction]) -> Result<()> {
    for (index, action) in actions.iter().enumerate() {
        debug!("Running action {}/{}: {}", index + 1, actions.len(), describe(action));
        run_action(page, action)
            .await
            .with_context(|| format!("Action {} ({}) failed", index + 1, describe(action)))?;
    }
    Ok(())
}

async fn run_action(page: &Page, action: &PageAction) -> Result<()> {
    match action {
        PageAction::Click { selector } => {
            page.find_element(selector.as_str()).await?.click().await?;
            sleep(AFTER_CLICK).await;
        }
        PageAction::Type { selector, text } => {
            page.find_element(selector.as_str())
                .await?
                .click()
                .await?
                .type_str(text)
                .await?;
        }
        PageAction::Press { key } => {
            let target = match page.find_element(":focus").await {
                Ok(element) => element,
                Err(_) => page.find_element("body").await?,
            };
            target.press_key(key).await?;
        }
        PageAction::Wait { ms } => sleep(Duration::from_millis(*ms)).await,
        PageAction::WaitForSelector { selector } => {
            wait_for_selector(page, selector, SELECTOR_POLL).await;
        }
        PageAction::Scroll { pixels } => {
            page.evaluate(format!("window.scrollBy(0, {pixels})")).await?;
        }
        PageAction::ScrollToBottom => {
            page.evaluate(
                "window.scrollTo(0, Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight))",
            )
            .await?;
        }
    }
    Ok(())
}

fn describe(action: &PageAction) -> String {
    match action {
        PageAction::Click { selector } => format!("click {selector}"),
        PageAction::Type { selector, .. } => format!("type into {selector}"),
        PageAction::Press { key } => format!("press {key}"),
        PageAction::Wait { ms } => format!("wait {ms}ms"),
        PageAction::WaitForSelector { selector } => format!("wait for {selector}"),
        PageAction::Scroll { pixels } => format!("scroll {pixels}px"),
        PageAction::ScrollToBottom => "scroll to bottom".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_name_the_target() {
        assert_eq!(
            describe(&PageAction::Click { selector: "#accept".into() }),
            "click #accept"
        );
        assert_eq!(describe(&PageAction::Scroll { pixels: -400 }), "scroll -400px");
        assert!(!describe(&PageAction::Type {
            selector: "input[name=q]".into(),
            text: "secret".into()
        })
        .contains("secret"));
    }
}
