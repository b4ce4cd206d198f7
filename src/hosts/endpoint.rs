//! One running per-site (or admin) mesh endpoint (spec.md §4.5).

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A started endpoint's handle. Closing consumes it: sends the shutdown
/// signal then waits for the serving task to finish.
pub struct SiteEndpoint {
    pub site: String,
    pub public: bool,
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl SiteEndpoint {
    pub fn new(site: String, public: bool, handle: JoinHandle<()>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            site,
            public,
            handle,
            shutdown,
        }
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
