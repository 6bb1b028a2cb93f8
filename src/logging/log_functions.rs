use cfg_if::cfg_if;

use super::{LogError, LogEvent};
use crate::logging::LogInterface;

// Generation runs on a single thread, so the logger is stashed in a thread-local.
cfg_if! {
    if #[cfg(feature = "logging")] {
        use std::cell::RefCell;

        thread_local! {
            static LOGGER: RefCell<Option<LogInterface>> = const { RefCell::new(None) };
        }
    }
}

cfg_if! {
    if #[cfg(feature = "logging")] {

        /// Logs with a callback. This should be used when constructing the event is particularly expensive.
        /// The callback is only invoked if the logger is set AND the filter permits the event.
        #[inline]
        pub fn log_event_cb<T: LogEvent, F>(callback: F) -> Result<(), LogError>
        where
            F: FnOnce() -> T,
        {
            LOGGER.with(|logger| match logger.borrow().as_ref() {
                Some(interface) if interface.log_filter.enabled::<T>() => interface.log(&callback()),
                Some(_) => Ok(()),
                None => Ok(()),
            })
        }

        /// Standard logging method, which logs to the underlying logger.
        #[inline]
        pub fn log_event<T: LogEvent>(event: &T) -> Result<(), LogError> {
            LOGGER.with(|logger| match logger.borrow().as_ref() {
                Some(interface) if interface.log_filter.enabled::<T>() => interface.log(event),
                Some(_) => Ok(()),
                None => Ok(()),
            })
        }

        /// Initializes the thread-local log with a specific logger.
        pub fn initialize_log(logger: LogInterface) {
            LOGGER.with(|lg| *lg.borrow_mut() = Some(logger))
        }

        /// Removes the thread-local logger, returning it if one was installed.
        pub fn take_log() -> Option<LogInterface> {
            LOGGER.with(|lg| lg.borrow_mut().take())
        }

        /// Renames the scope attached to subsequent entries.
        pub fn set_log_scope(scope: &str) {
            LOGGER.with(|cur_logger| {
                if let Some(lg) = cur_logger.borrow_mut().as_mut() {
                    lg.set_scope(scope);
                }
            })
        }

    } else {
        // Marked as allow(unused) so that we can keep the same signature and names.

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn log_event_cb<T: LogEvent, F>(callback: F) -> Result<(), LogError> where F: FnOnce() -> T { Ok(()) }

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn log_event<T: LogEvent>(event: &T) -> Result<(), LogError> { Ok(()) }

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn initialize_log(logger: LogInterface) {}

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn take_log() -> Option<LogInterface> { None }

        /// No-op without logging enabled
        #[allow(unused)]
        #[inline]
        pub fn set_log_scope(scope: &str) {}
    }
}
