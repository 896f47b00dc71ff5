use rustc_hash::FxHashMap;

use crate::diagnostics::Span;
use crate::runtime::environment::Env;
use crate::runtime::values::Value;
use crate::runtime::{ModuleRegistry, Runtime};
use crate::surface::ast::Stmt;
use crate::surface::printer::render_program;
use crate::Error;

/// What a pass asks the tracer to record. Execution itself always happens;
/// these only control how much is written down.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceArgs {
    pub trace_reads: bool,
    pub trace_lines: bool,
}

impl TraceArgs {
    pub fn reads() -> Self {
        TraceArgs {
            trace_reads: true,
            trace_lines: false,
        }
    }

    pub fn reads_and_lines() -> Self {
        TraceArgs {
            trace_reads: true,
            trace_lines: true,
        }
    }

    pub fn lines() -> Self {
        TraceArgs {
            trace_reads: false,
            trace_lines: true,
        }
    }
}

/// One observed read or write of a variable: where it happened, whether it
/// happened inside a nested function frame, a deep snapshot of the value,
/// and its position in the global event order.
#[derive(Debug, Clone)]
pub struct AccessEvent {
    pub line: usize,
    pub in_closure: bool,
    pub value: Value,
    pub seq: u64,
}

#[derive(Default)]
pub struct TraceRecord {
    pub reads: FxHashMap<String, Vec<AccessEvent>>,
    pub writes: FxHashMap<String, Vec<AccessEvent>>,
    pub line_counts: FxHashMap<usize, u64>,
}

/// Receives instrumentation events from the runtime during one traced
/// execution. This is the runtime-facing half of the instrumentation
/// boundary; `Trace` is the pass-facing half.
pub struct TraceSink {
    args: TraceArgs,
    record: TraceRecord,
    next_seq: u64,
}

impl TraceSink {
    pub fn new(args: TraceArgs) -> Self {
        TraceSink {
            args,
            record: TraceRecord::default(),
            next_seq: 0,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn on_line(&mut self, line: usize) {
        if self.args.trace_lines {
            *self.record.line_counts.entry(line).or_insert(0) += 1;
        }
    }

    pub(crate) fn on_store(&mut self, name: &str, line: usize, in_closure: bool, value: &Value) {
        if self.args.trace_reads {
            let seq = self.bump_seq();
            self.record
                .writes
                .entry(name.to_string())
                .or_default()
                .push(AccessEvent {
                    line,
                    in_closure,
                    value: value.snapshot(),
                    seq,
                });
        }
    }

    pub(crate) fn on_load(&mut self, name: &str, line: usize, in_closure: bool, value: &Value) {
        if self.args.trace_reads {
            let seq = self.bump_seq();
            self.record
                .reads
                .entry(name.to_string())
                .or_default()
                .push(AccessEvent {
                    line,
                    in_closure,
                    value: value.snapshot(),
                    seq,
                });
        }
    }
}

/// The result of one instrumented execution: the event record, the final
/// global environment, and the runtime that produced them (kept so the
/// resolver can look through already-loaded modules). Valid only for the
/// exact tree that was executed.
pub struct Trace {
    pub record: TraceRecord,
    pub globals: Env,
    pub runtime: Runtime,
}

impl Trace {
    pub fn reads(&self, name: &str) -> &[AccessEvent] {
        self.record
            .reads
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn writes(&self, name: &str) -> &[AccessEvent] {
        self.record
            .writes
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn read_count(&self, name: &str) -> usize {
        self.reads(name).len()
    }

    pub fn store_count(&self, name: &str) -> usize {
        self.writes(name).len()
    }

    pub fn has_closure_event(&self, name: &str) -> bool {
        self.reads(name).iter().any(|event| event.in_closure)
            || self.writes(name).iter().any(|event| event.in_closure)
    }

    pub fn line_count(&self, line: usize) -> u64 {
        self.record.line_counts.get(&line).copied().unwrap_or(0)
    }

    /// Whether any line of the span was ever executed.
    pub fn span_executed(&self, span: Span) -> bool {
        (span.start.line..=span.end.line).any(|line| self.line_count(line) > 0)
    }

    /// Lines whose stores of a name were never observed: every write from
    /// that line was chronologically followed by the next write with no read
    /// in between. A line with even one observed store is live, since
    /// removing its statement would remove all its executions.
    pub fn unused_store_lines(&self) -> FxHashMap<String, Vec<usize>> {
        let mut unused: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (name, stores) in &self.record.writes {
            let reads = self.reads(name);
            let mut per_line: FxHashMap<usize, bool> = FxHashMap::default();
            for (index, store) in stores.iter().enumerate() {
                let next_seq = stores
                    .get(index + 1)
                    .map(|event| event.seq)
                    .unwrap_or(u64::MAX);
                let observed = reads
                    .iter()
                    .any(|read| store.seq < read.seq && read.seq < next_seq);
                let all_dead = per_line.entry(store.line).or_insert(true);
                *all_dead &= !observed;
            }
            for (line, all_dead) in per_line {
                if all_dead {
                    unused.entry(name.clone()).or_default().push(line);
                }
            }
        }
        unused
    }
}

pub struct Tracer;

impl Tracer {
    /// Executes the program exactly once under instrumentation. Side effects
    /// of the traced program are real and happen once per call. A failure of
    /// the program itself propagates with the instrumented source attached.
    pub fn trace(
        stmts: &[Stmt],
        registry: &ModuleRegistry,
        args: TraceArgs,
    ) -> Result<Trace, Error> {
        let mut runtime = Runtime::with_sink(registry.clone(), TraceSink::new(args));
        match runtime.run_program(stmts) {
            Ok(globals) => {
                let record = runtime
                    .sink
                    .take()
                    .map(|sink| sink.record)
                    .unwrap_or_default();
                Ok(Trace {
                    record,
                    globals,
                    runtime,
                })
            }
            Err(error) => Err(Error::Traced {
                message: error.to_string(),
                source_text: render_program(stmts),
            }),
        }
    }
}
