use metric::Metric;
use sink::Uploader;

/// Null uploader
///
/// This uploader is intended for testing and demonstration. Every `Metric`
/// it receives is pulled from the sequence and deallocated.
#[derive(Debug, Default)]
pub struct Null {
    uploaded: usize,
}

impl Null {
    /// Create a new Null uploader
    pub fn new() -> Null {
        Null::default()
    }

    /// The total number of metrics discarded so far.
    pub fn uploaded(&self) -> usize {
        self.uploaded
    }
}

impl Uploader for Null {
    fn upload(&mut self, metrics: &mut dyn Iterator<Item = Metric>) {
        // discard points
        let count = metrics.count();
        self.uploaded += count;
        debug!("[null] discarded {} metrics", count);
    }
}
