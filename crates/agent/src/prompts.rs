use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use telos_core::config::ChatConfig;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const HALLUCINATION_PREVENTION_PROMPT: &str = r#"CRITICAL: DO NOT HALLUCINATE DATA

You MUST follow these rules:

1. ONLY extract data that is EXPLICITLY stated in the conversation
   - If the user didn't provide their name, return null for name
   - If the user didn't provide an email, return null for email
   - NEVER make up or infer information

2. If data is missing, return null. DO NOT guess
   - BAD: "john@example.com" (if not provided)
   - GOOD: null (if not provided)

3. Verify data exists in the conversation before extracting
   - Check that the name/email/company was actually mentioned
   - If not mentioned, return null

4. Never use placeholder values
   - BAD: "example@email.com", "N/A", "Not provided"
   - GOOD: null

5. Be honest about what you know
   - If you're not sure, return null
   - Better to have missing data than wrong data

Remember: Missing data is better than hallucinated data."#;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Telos, an automation consultant chatting with \
a prospective client on our website. Keep replies under 200 words and on the subject of \
automation, AI and the visitor's business. Early in the conversation collect the visitor's \
name, company and email. Then learn the problem they want solved, the kind of automation \
they have in mind, the tools they use today, their budget range and their timeline. Once you \
have all of that, tell them you will send a tailored proposal to their inbox.";

/// Markdown sections composed for the lead-briefing stage, in order.
pub const BRIEFING_SECTIONS: &[&str] =
    &["objective", "context", "lead-collection", "early-extraction", "anti-hallucination", "briefing"];

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Supplies the raw system prompt; its content is opaque to the pipeline.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn load(&self) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct StaticPromptSource {
    prompt: String,
}

impl StaticPromptSource {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into() }
    }
}

impl Default for StaticPromptSource {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[async_trait]
impl PromptSource for StaticPromptSource {
    async fn load(&self) -> Result<String> {
        Ok(self.prompt.clone())
    }
}

/// Concatenates `<dir>/<section>.md` files. Missing sections are skipped;
/// a directory with none of them is an error.
#[derive(Clone, Debug)]
pub struct FilePromptSource {
    dir: PathBuf,
    sections: Vec<String>,
}

impl FilePromptSource {
    pub fn new(dir: impl Into<PathBuf>, sections: &[&str]) -> Self {
        Self { dir: dir.into(), sections: sections.iter().map(|name| name.to_string()).collect() }
    }

    pub fn briefing(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, BRIEFING_SECTIONS)
    }
}

#[async_trait]
impl PromptSource for FilePromptSource {
    async fn load(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let path = self.dir.join(format!("{section}.md"));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) if !content.trim().is_empty() => parts.push(content.trim().to_string()),
                Ok(_) => debug!(
                    event_name = "prompt.section.empty",
                    section = %section,
                    "prompt section is empty, skipping"
                ),
                Err(error) => warn!(
                    event_name = "prompt.section.unreadable",
                    section = %section,
                    error = %error,
                    "prompt section could not be read, skipping"
                ),
            }
        }

        if parts.is_empty() {
            bail!("no prompt sections found in `{}`", self.dir.display());
        }
        Ok(parts.join(SECTION_SEPARATOR))
    }
}

struct CachedPrompt {
    content: String,
    loaded_at: Instant,
}

/// Long-lived prompt cache with a TTL and an explicit reset.
pub struct CachedPromptSource {
    inner: Arc<dyn PromptSource>,
    ttl: Duration,
    cached: RwLock<Option<CachedPrompt>>,
}

impl CachedPromptSource {
    pub fn new(inner: Arc<dyn PromptSource>, ttl: Duration) -> Self {
        Self { inner, ttl, cached: RwLock::new(None) }
    }

    pub async fn reset(&self) {
        self.cached.write().await.take();
    }

    pub async fn is_warm(&self) -> bool {
        self.cached.read().await.as_ref().is_some_and(|entry| entry.loaded_at.elapsed() < self.ttl)
    }
}

#[async_trait]
impl PromptSource for CachedPromptSource {
    async fn load(&self) -> Result<String> {
        if let Some(entry) = self.cached.read().await.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.content.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(entry) = cached.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.content.clone());
            }
        }

        let content = self.inner.load().await?;
        debug!(event_name = "prompt.cache.refreshed", chars = content.len(), "system prompt reloaded");
        *cached = Some(CachedPrompt { content: content.clone(), loaded_at: Instant::now() });
        Ok(content)
    }
}

/// Cached markdown sections when a prompt directory is configured, the
/// built-in prompt otherwise.
pub fn prompt_source_from_config(config: &ChatConfig) -> Arc<dyn PromptSource> {
    match &config.prompt_dir {
        Some(dir) => Arc::new(CachedPromptSource::new(
            Arc::new(FilePromptSource::briefing(dir)),
            Duration::from_secs(config.prompt_cache_ttl_secs),
        )),
        None => Arc::new(StaticPromptSource::default()),
    }
}
