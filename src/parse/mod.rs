// Trace text parsing
//
// Tokenizer → schema-driven argument decoding → event reassembly. The output
// is a single ordered stream of calls and process exits per trace; nothing in
// this module fails on bad input except by recording diagnostics.

mod event;
mod parser;
mod schema;
mod tokenizer;

pub use event::{
    ArgValue, CallResult, CallState, ExitStatus, Pid, ProcessExit, SockAddr, SyscallEvent,
    TraceEntry,
};
pub use parser::{parse_trace, EventParser, ParseStats, ParsedTrace};
pub use schema::{decode_args, schema_for, split_top_level, unescape, ArgKind};
pub use tokenizer::{tokenize, ReturnMarker, Token};
