use std::any::Any;

use assert_call::call;

use crate::BoxError;

/// Returns a value that records `name` when dropped.
pub fn call_on_drop(name: &'static str) -> impl Any {
    struct OnDrop(&'static str);
    impl Drop for OnDrop {
        fn drop(&mut self) {
            call!("{}", self.0);
        }
    }
    OnDrop(name)
}

pub fn error(message: &str) -> BoxError {
    message.into()
}

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}
