pub mod common;
mod job_queue_tests;
mod notice_tests;
mod progress_tests;
