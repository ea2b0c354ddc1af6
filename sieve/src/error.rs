use std::path::PathBuf;

use derive_more::{Display, From};
use flume::{RecvError, SendError};
use sieve_common::{ConstantError, EventType};
use tokio::task::JoinError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum Error {
	#[from(String, &String, &str)]
	Custom(String),
	EventSend(String),
	EventRecv(RecvError),
	#[display("eBPF program '{_0}' not found")]
	EbpfProgNotFound(&'static str),
	#[display("eBPF map '{_0}' not found")]
	EbpfMapNotFound(&'static str),
	InvalidEventSize,
	UnknownEventType(u64),
	LockPoison,

	// -- Config
	#[display("cannot read '{}': {cause}", path.display())]
	ConfigRead { path: PathBuf, cause: std::io::Error },
	#[display("invalid duration '{value}': {cause}")]
	InvalidDuration { value: String, cause: humantime::DurationError },

	// -- Policy
	#[display("unknown event type '{_0}'")]
	UnknownEvent(String),
	#[display("event '{_0}' is not hooked and cannot be enabled")]
	UnhookedEvent(EventType),
	#[display("unknown flag field '{field}' for event '{event}'")]
	UnknownFlagField { event: EventType, field: String },
	#[display("flag value {value:#x} of '{field}' does not fit in 32 bits")]
	FlagOutOfRange { field: &'static str, value: u64 },
	#[display("invalid basename '{_0}'")]
	InvalidBasename(String),
	#[display("inverted auid range {min}..={max} for event '{event}'")]
	InvertedAuidRange { event: EventType, min: u32, max: u32 },
	#[display("{count} {kind} approvers exceed the map capacity of {capacity}")]
	TooManyApprovers { kind: &'static str, count: usize, capacity: u32 },
	CatalogMismatch,

	// -- Externals
	#[from]
	Constant(ConstantError),
	#[from]
	TomlDe(toml::de::Error),
	#[from]
	JoinError(JoinError),
	#[from]
	AyaEbpf(aya::EbpfError),
	#[from]
	AyaMaps(aya::maps::MapError),
	#[from]
	AyaProgram(aya::programs::ProgramError),
	#[from]
	Io(std::io::Error),
	#[from]
	Notify(notify::Error),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
	fn from(_val: std::sync::PoisonError<T>) -> Self {
		Self::LockPoison
	}
}

impl<T> From<SendError<T>> for Error {
	fn from(value: SendError<T>) -> Self {
		Self::EventSend(value.to_string())
	}
}

impl From<RecvError> for Error {
	fn from(err: RecvError) -> Self {
		Self::EventRecv(err)
	}
}

// region:    --- Custom

impl Error {
	pub fn custom(val: impl Into<String>) -> Self {
		Self::Custom(val.into())
	}
}

// endregion: --- Custom

// region:    --- Error Boilerplate

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
