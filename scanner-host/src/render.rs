//! Single-threaded render/hardware context
//!
//! All camera and view operations run on one dedicated thread that drains a
//! FIFO of closures over the [`Stage`]. The stage owns the driver and the one
//! [`CameraResource`]; nothing else can reach them.

use scanner_api::{BarcodeFormat, CameraFacing};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

use crate::camera::{CameraDriver, CameraResource};
use crate::error::ScanError;

type Job = Box<dyn FnOnce(&mut Stage) + Send>;

/// State owned by the render thread
pub struct Stage {
    driver: Box<dyn CameraDriver>,
    camera: Option<CameraResource>,
}

impl Stage {
    pub fn new(driver: Box<dyn CameraDriver>) -> Self {
        Self {
            driver,
            camera: None,
        }
    }

    /// Acquire the camera. Acquiring while one is alive is a caller error.
    pub fn acquire(
        &mut self,
        facing: CameraFacing,
        formats: &[BarcodeFormat],
    ) -> Result<(), ScanError> {
        if self.camera.is_some() {
            return Err(ScanError::unexpected("camera already acquired"));
        }
        let resource = CameraResource::acquire(self.driver.as_mut(), facing, formats)?;
        self.camera = Some(resource);
        Ok(())
    }

    /// Release the camera if one is held
    pub fn release(&mut self) -> bool {
        match self.camera.take() {
            Some(resource) => {
                resource.release();
                true
            }
            None => false,
        }
    }

    /// The live camera, if any
    pub fn camera(&mut self) -> Option<&mut CameraResource> {
        self.camera.as_mut()
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }
}

/// Handle for posting work to the render thread
#[derive(Clone)]
pub struct RenderContext {
    jobs: mpsc::UnboundedSender<Job>,
}

impl RenderContext {
    /// Start the render thread
    ///
    /// The thread exits once every `RenderContext` clone is dropped, dropping
    /// the stage and with it any camera still held.
    pub fn spawn(driver: Box<dyn CameraDriver>) -> Result<(Self, JoinHandle<()>), ScanError> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let mut stage = Stage::new(driver);

        let thread = std::thread::Builder::new()
            .name("scanner-render".into())
            .spawn(move || {
                tracing::debug!("Render thread started");
                while let Some(job) = queue.blocking_recv() {
                    job(&mut stage);
                }
                stage.release();
                tracing::debug!("Render thread stopped");
            })
            .map_err(|e| ScanError::unexpected(format!("failed to start render thread: {e}")))?;

        Ok((Self { jobs }, thread))
    }

    /// Queue a closure without waiting for it
    pub fn post(&self, job: impl FnOnce(&mut Stage) + Send + 'static) {
        if self.jobs.send(Box::new(job)).is_err() {
            tracing::warn!("Render thread gone, dropping job");
        }
    }

    /// Queue a closure and wait for its result
    pub async fn call<R>(
        &self,
        job: impl FnOnce(&mut Stage) -> R + Send + 'static,
    ) -> Result<R, ScanError>
    where
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |stage| {
            let _ = tx.send(job(stage));
        });
        rx.await
            .map_err(|_| ScanError::unexpected("render thread stopped"))
    }

    /// Wait until everything queued so far has run
    pub async fn flush(&self) -> Result<(), ScanError> {
        self.call(|_| ()).await
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCamera;

    #[tokio::test]
    async fn test_jobs_run_in_order_on_one_thread() {
        let camera = FakeCamera::new();
        let (render, thread) = RenderContext::spawn(Box::new(camera.driver())).unwrap();

        let first = render
            .call(|_| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("scanner-render"));

        render.post(|stage| {
            stage.acquire(CameraFacing::Back, &[]).unwrap();
        });
        let held = render.call(|stage| stage.has_camera()).await.unwrap();
        assert!(held);

        drop(render);
        thread.join().unwrap();
        assert_eq!(camera.probe().live_devices(), 0);
    }

    #[tokio::test]
    async fn test_double_acquire_is_rejected() {
        let camera = FakeCamera::new();
        let (render, _thread) = RenderContext::spawn(Box::new(camera.driver())).unwrap();

        let first = render
            .call(|stage| stage.acquire(CameraFacing::Back, &[]))
            .await
            .unwrap();
        assert!(first.is_ok());

        let second = render
            .call(|stage| stage.acquire(CameraFacing::Back, &[]))
            .await
            .unwrap();
        assert!(matches!(second, Err(ScanError::Unexpected(_))));
        assert_eq!(camera.probe().open_count(), 1);

        assert!(render.call(|stage| stage.release()).await.unwrap());
        assert!(!render.call(|stage| stage.release()).await.unwrap());
    }
}
