//! Work queue behavior under real thread contention.
//!
//! The per-crate unit tests cover the single-threaded contract; these tests
//! drive the queue with producer and consumer thread pools and check the
//! properties policy runs depend on: at-most-once delivery, bounded memory
//! under backpressure, and counters that survive shutdown.
