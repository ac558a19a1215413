//! Managed pool of headless Chrome instances
//!
//! The rendered-fetch strategy draws persistent browser instances from
//! this pool instead of launching Chrome per page. Instances whose CDP
//! handler has died are relaunched lazily at checkout time.

use crate::config::{create_browser_config, Config};
use crate::error::CrawlError;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

struct BrowserInstance {
    id: usize,
    browser: Arc<Mutex<Browser>>,
    handler: tokio::task::JoinHandle<()>,
    pages_rendered: usize,
}

impl BrowserInstance {
    fn is_healthy(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn shutdown(self) {
        let _ = self.browser.lock().await.close().await;
        self.handler.abort();
    }
}

/// A checked-out browser. Returns its instance to the pool on drop; the
/// held permit keeps the pool's concurrency accounting exact.
pub struct BrowserLease {
    browser: Arc<Mutex<Browser>>,
    instance_id: usize,
    pool: Arc<BrowserPool>,
    _permit: OwnedSemaphorePermit,
}

impl BrowserLease {
    pub fn browser(&self) -> &Arc<Mutex<Browser>> {
        &self.browser
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let instance_id = self.instance_id;
        tokio::spawn(async move {
            pool.release(instance_id).await;
        });
    }
}

pub struct BrowserPool {
    instances: Mutex<Vec<BrowserInstance>>,
    available: Mutex<VecDeque<usize>>,
    slots: Arc<Semaphore>,
    config: Config,
    restarts: AtomicUsize,
    shutting_down: AtomicBool,
}

impl BrowserPool {
    pub async fn new(config: Config) -> Result<Arc<Self>, CrawlError> {
        let pool = Arc::new(Self {
            instances: Mutex::new(Vec::new()),
            available: Mutex::new(VecDeque::new()),
            slots: Arc::new(Semaphore::new(config.browser_pool_size)),
            config,
            restarts: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        });

        {
            let mut instances = pool.instances.lock().await;
            let mut available = pool.available.lock().await;
            for id in 0..pool.config.browser_pool_size {
                let instance = pool.launch_instance(id).await?;
                instances.push(instance);
                available.push_back(id);
                info!("browser instance {} launched", id);
            }
        }

        info!(
            "browser pool ready with {} instances",
            pool.config.browser_pool_size
        );
        Ok(pool)
    }

    async fn launch_instance(&self, id: usize) -> Result<BrowserInstance, CrawlError> {
        let browser_config = create_browser_config(&self.config, id)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CrawlError::BrowserLaunchFailed(e.to_string()))?;

        // The CDP handler is a stream that must be polled for the browser
        // to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("browser handler error: {}", e);
                    break;
                }
            }
            debug!("browser handler stream ended");
        });

        Ok(BrowserInstance {
            id,
            browser: Arc::new(Mutex::new(browser)),
            handler: handler_task,
            pages_rendered: 0,
        })
    }

    /// Check out a healthy browser, relaunching a dead instance in place
    /// when necessary.
    pub async fn checkout(self: &Arc<Self>) -> Result<BrowserLease, CrawlError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(CrawlError::BrowserUnavailable);
        }

        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::BrowserUnavailable)?;

        let instance_id = {
            let mut available = self.available.lock().await;
            available.pop_front().ok_or(CrawlError::BrowserUnavailable)?
        };

        let mut instances = self.instances.lock().await;
        let instance = instances
            .get_mut(instance_id)
            .ok_or(CrawlError::BrowserUnavailable)?;

        if !instance.is_healthy() {
            warn!("browser instance {} is dead, relaunching", instance_id);
            match self.launch_instance(instance_id).await {
                Ok(fresh) => {
                    let old = std::mem::replace(instance, fresh);
                    old.handler.abort();
                    self.restarts.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Give the slot back so a later checkout can retry.
                    drop(instances);
                    self.available.lock().await.push_back(instance_id);
                    return Err(e);
                }
            }
        }

        instance.pages_rendered += 1;
        Ok(BrowserLease {
            browser: instance.browser.clone(),
            instance_id,
            pool: self.clone(),
            _permit: permit,
        })
    }

    async fn release(&self, instance_id: usize) {
        self.available.lock().await.push_back(instance_id);
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&self) {
        info!("shutting down browser pool");
        self.shutting_down.store(true, Ordering::Relaxed);

        let mut instances = self.instances.lock().await;
        for instance in instances.drain(..) {
            let id = instance.id;
            instance.shutdown().await;
            debug!("browser instance {} closed", id);
        }
        self.available.lock().await.clear();

        info!("browser pool shutdown complete");
    }

    pub async fn stats(&self) -> BrowserPoolStats {
        let instances = self.instances.lock().await;
        BrowserPoolStats {
            total_instances: instances.len(),
            available_instances: self.available.lock().await.len(),
            total_pages_rendered: instances.iter().map(|i| i.pages_rendered).sum(),
            restarts: self.restarts(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserPoolStats {
    pub total_instances: usize,
    pub available_instances: usize,
    pub total_pages_rendered: usize,
    pub restarts: usize,
}
