#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use futures::future::BoxFuture;
use gradeit::{
    ai::{ProviderClient, ProviderError},
    pipeline::{ArtifactSource, PipelineArtifacts},
};
use uuid::Uuid;

pub fn temp_root(label: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("gradeit-{label}-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

/// A provider that always gives the same answer and counts calls.
pub struct ScriptedProvider {
    name:  &'static str,
    reply: Result<String, String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn ok(name: &'static str, text: &str) -> (Self, Arc<AtomicUsize>) {
        Self::new(name, Ok(text.to_string()))
    }

    pub fn failing(name: &'static str, message: &str) -> (Self, Arc<AtomicUsize>) {
        Self::new(name, Err(message.to_string()))
    }

    fn new(name: &'static str, reply: Result<String, String>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                reply,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ProviderClient for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn submit<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone().map_err(|message| ProviderError::Request {
            provider: self.name.to_string(),
            message,
        });
        Box::pin(async move { reply })
    }
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Pretends every repository builds and passes its tests, except those whose
/// path contains `fail_for`.
#[derive(Default)]
pub struct CannedArtifacts {
    pub fail_for: Option<&'static str>,
}

impl ArtifactSource for CannedArtifacts {
    async fn gather(&self, repo: &Path) -> Result<PipelineArtifacts> {
        if let Some(name) = self.fail_for {
            if repo.to_string_lossy().contains(name) {
                anyhow::bail!("gradle daemon crashed");
            }
        }

        let mut artifacts = PipelineArtifacts::default();
        artifacts.build.success = true;
        artifacts.build.output = "BUILD SUCCESSFUL".to_string();
        artifacts.tests.total = 2;
        artifacts.tests.passed = 2;
        artifacts
            .sources
            .files
            .insert("Main.java".to_string(), "public class Main {}".to_string());
        Ok(artifacts)
    }
}
