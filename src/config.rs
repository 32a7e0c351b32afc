use std::path::PathBuf;
use std::time::Duration;

pub const PLATFORM_HOST: &str = "https://blog.naver.com";
pub const MOBILE_HOST: &str = "https://m.blog.naver.com";
pub const LISTING_ENDPOINT: &str = "https://blog.naver.com/PostTitleListAsync.naver";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const LEDGER_FILE: &str = "done_urls.txt";
pub const DEFAULT_CATEGORY_KEY: &str = "경제/주식/국제정세/사회";

/// Settings for one archive run, folded from the CLI.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub out_dir: PathBuf,
    pub throttle: Throttle,
    pub page_size: u32,
    pub wait_timeout: Duration,
    pub mobile_wait_timeout: Duration,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub profile_dir: Option<String>,
}

impl RunConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.out_dir.join(LEDGER_FILE)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("./naver_pdfs"),
            throttle: Throttle::jittered(Duration::from_millis(1200)),
            page_size: 30,
            wait_timeout: Duration::from_secs(20),
            mobile_wait_timeout: Duration::from_secs(10),
            headless: true,
            user_data_dir: None,
            profile_dir: None,
        }
    }
}

/// Courtesy delay after every processed post: `max(floor, base + U(low, high))`.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    pub base: Duration,
    pub jitter_low_ms: i64,
    pub jitter_high_ms: i64,
    pub floor: Duration,
}

impl Throttle {
    pub fn jittered(base: Duration) -> Self {
        Self {
            base,
            jitter_low_ms: -150,
            jitter_high_ms: 250,
            floor: Duration::from_millis(200),
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter_low_ms: 0,
            jitter_high_ms: 0,
            floor: Duration::ZERO,
        }
    }

    pub fn pick(&self) -> Duration {
        use rand::Rng;

        let jitter = if self.jitter_high_ms > self.jitter_low_ms {
            rand::thread_rng().gen_range(self.jitter_low_ms..=self.jitter_high_ms)
        } else {
            self.jitter_low_ms
        };
        let millis = (self.base.as_millis() as i64 + jitter).max(0) as u64;
        Duration::from_millis(millis).max(self.floor)
    }

    pub async fn sleep(&self) {
        let d = self.pick();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}
