/// Identity presented by stealth pages
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub accept_language: String,
    pub platform: String,
    pub languages: Vec<String>,
    pub screen_width: u32,
    pub screen_height: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub hardware_concurrency: u32,
}

impl Default for StealthProfile {
    fn default() -> Self {
        Self {
            accept_language: "en-US,en;q=0.9".to_string(),
            platform: "Win32".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
            screen_width: 1920,
            screen_height: 1080,
            webgl_vendor: "Intel Inc.".to_string(),
            webgl_renderer: "Intel(R) UHD Graphics".to_string(),
            hardware_concurrency: 8,
        }
    }
}

impl StealthProfile {
    /// `window.__wf` bootstrap read by the evasion scripts
    pub(crate) fn bootstrap_script(&self, session_seed: &str) -> String {
        let languages =
            serde_json::to_string(&self.languages).unwrap_or_else(|_| "[\"en-US\"]".to_string());
        format!(
            r#"Object.defineProperty(window, '__wf', {{
    value: Object.freeze({{
        platform: {platform},
        languages: {languages},
        screenWidth: {width},
        screenHeight: {height},
        webglVendor: {vendor},
        webglRenderer: {renderer},
        hardwareConcurrency: {cores},
        sessionSeed: {seed}
    }}),
    enumerable: false
}});"#,
            platform = js_string(&self.platform),
            width = self.screen_width,
            height = self.screen_height,
            vendor = js_string(&self.webgl_vendor),
            renderer = js_string(&self.webgl_renderer),
            cores = self.hardware_concurrency,
            seed = js_string(session_seed),
        )
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
