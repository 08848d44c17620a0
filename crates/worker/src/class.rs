/// Execution classes used to tag spawned work for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work that reacts directly to user edits (debounce timers, validation).
	Interactive,
	/// Work that may lag behind the user (share links, status relays, cleanup).
	Background,
	/// Long-running CPU-bound work on a dedicated OS thread (the analysis engine).
	CpuBlocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}
