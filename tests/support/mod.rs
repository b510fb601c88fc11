pub mod harness;

pub use harness::{FakeKind, FakeProxy, Observed, ScriptedStream};
