use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    fn name(&self) -> &str;

    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type SharedComponent = Arc<Mutex<dyn LifecycleComponent + Send + Sync>>;

/// Drives attached components through init, start and shutdown in
/// attachment order. Shutdown runs in reverse and never stops early.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<SharedComponent>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Created,
            components: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attach(&mut self, component: SharedComponent) {
        self.components.push(component);
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Lifecycle phase: init");
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }
        self.state = LifecycleState::Initialized;

        info!("Lifecycle phase: start");
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }
        self.state = LifecycleState::Ready;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Lifecycle phase: shutdown");
        self.state = LifecycleState::Shutdown;
        for comp in self.components.iter().rev() {
            let mut guard = comp.lock().await;
            if let Err(e) = guard.on_shutdown().await {
                warn!("Component {} shutdown error: {}", guard.name(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<std::sync::Mutex<Vec<String>>>,
        fail_shutdown: bool,
    }

    #[async_trait::async_trait]
    impl LifecycleComponent for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        async fn on_init(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("init:{}", self.name));
            Ok(())
        }
        async fn on_start(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            Ok(())
        }
        async fn on_shutdown(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("stop:{}", self.name));
            if self.fail_shutdown {
                anyhow::bail!("refused");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn phases_run_in_order_and_shutdown_is_reversed() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut mgr = LifecycleManager::new();
        for (name, fail_shutdown) in [("store", false), ("api", true)] {
            mgr.attach(Arc::new(Mutex::new(Recorder {
                name,
                log: log.clone(),
                fail_shutdown,
            })));
        }
        mgr.start().await.unwrap();
        assert_eq!(mgr.state(), LifecycleState::Ready);
        mgr.shutdown().await.unwrap();
        assert_eq!(mgr.state(), LifecycleState::Shutdown);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "init:store",
                "init:api",
                "start:store",
                "start:api",
                "stop:api",
                "stop:store"
            ]
        );
    }
}
