//! Test-only tracing setup, grounded on the teacher's `install_tracing_helpers` in the bare
//! `disk_v2/tests/mod.rs` (not the `variants/disk_v2` copy): a one-time `tracing_subscriber`
//! init so `debug!`/`warn!` call sites in `recovery`/`cache`/`editor` are visible with
//! `cargo test -- --nocapture` instead of being
//! silently dropped, without the teacher's `tracing-fluent-assertions` registry (unused here;
//! this crate doesn't assert on span events, just wants readable output on failure).

use std::sync::Once;

static INIT: Once = Once::new();

pub(crate) fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
