use chrono::Utc;
use metric::Metric;
use serde_json;
use sink::Uploader;
use std::io::{self, Write};

/// Console uploader
///
/// Writes each uploaded `Metric` to stdout as one line of compact JSON, after
/// a header line naming the time of the upload. Intended for debugging a
/// deployment without a real destination.
pub struct Console {
    out: Box<dyn Write + Send>,
}

impl Console {
    /// Create a new Console uploader writing to stdout.
    pub fn new() -> Console {
        Console::with_writer(Box::new(io::stdout()))
    }

    /// Create a Console uploader writing to `out` instead of stdout.
    pub fn with_writer(out: Box<dyn Write + Send>) -> Console {
        Console { out: out }
    }

    fn write_all(&mut self, metrics: &mut dyn Iterator<Item = Metric>) -> io::Result<usize> {
        writeln!(self.out, "Metric upload: {}", Utc::now().to_rfc3339())?;
        let mut total = 0;
        for metric in metrics {
            serde_json::to_writer(&mut self.out, &metric)?;
            self.out.write_all(b"\n")?;
            total += 1;
        }
        self.out.flush()?;
        Ok(total)
    }
}

impl Default for Console {
    fn default() -> Console {
        Console::new()
    }
}

impl Uploader for Console {
    fn upload(&mut self, metrics: &mut dyn Iterator<Item = Metric>) {
        match self.write_all(metrics) {
            Ok(total) => debug!("[console] wrote {} metrics", total),
            Err(e) => error!("[console] error uploading metrics: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use metric::TagMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_one_json_line_per_metric() {
        let buf = Shared::default();
        let mut console = Console::with_writer(Box::new(buf.clone()));
        let t = Utc.timestamp_opt(1_500_000_000, 0).unwrap();
        let mut tags = TagMap::default();
        tags.insert("job".to_string(), "a".to_string());
        let metrics = vec![
            Metric::new(t, "prometheus", "up", "1", &tags),
            Metric::new(t, "prometheus", "down", "0", &tags),
        ];

        console.upload(&mut metrics.into_iter());

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Metric upload: "));
        let first: Metric = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first.name, "up");
        let second: Metric = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(second.name, "down");
    }
}
