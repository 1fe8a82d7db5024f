//! End-to-end contribution queries over the directive test compiler.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use lore_engine::CancellationToken;
use lore_pointcut::{CallbackId, MemberSpec};
use lore_script::{ActivationStatus, FileKey};
use pretty_assertions::assert_eq;
use support::{QueryBuilder, type_subject, world};

#[test]
fn subtype_conditional_and_unconditional_scripts_compose() {
	let w = world();
	w.engine.index().register_text(FileKey::new("s1.lore"), "property foo when-subtype Base");
	w.engine.index().register_text(FileKey::new("s2.lore"), "property bar");

	let derived = type_subject(10, "Derived", &["Base"]);
	let other = type_subject(11, "Other", &[]);
	let cancel = CancellationToken::new();

	let holder = w.engine.contribute(&QueryBuilder::new(1, &derived).build(), &cancel);
	assert_eq!(holder.member_names(), vec!["foo", "bar"]);

	let holder = w.engine.contribute(&QueryBuilder::new(1, &other).build(), &cancel);
	assert_eq!(holder.member_names(), vec!["bar"]);
}

#[test]
fn repeated_query_is_served_from_cache() {
	let w = world();
	w.engine.index().register_text(FileKey::new("s1.lore"), "property foo when-subtype Base");
	w.engine.index().register_text(FileKey::new("s2.lore"), "property bar");

	let derived = type_subject(10, "Derived", &["Base"]);
	let cancel = CancellationToken::new();

	let first = w.engine.contribute(&QueryBuilder::new(1, &derived).build(), &cancel);
	let second = w.engine.contribute(&QueryBuilder::new(1, &derived).build(), &cancel);
	assert_eq!(first.member_names(), second.member_names());

	// One compile per file, and the second query never re-evaluates.
	assert_eq!(w.compiler.count("s1.lore"), 1);
	assert_eq!(w.compiler.count("s2.lore"), 1);
	let m = w.engine.metrics();
	assert_eq!(m.cache_misses, 2);
	assert_eq!(m.cache_hits, 2);
	assert_eq!(m.evaluations, 2);
}

#[test]
fn cache_entries_are_keyed_by_dereferenced_facts_only() {
	let w = world();
	// s1 dereferences the subject type, s2 never does.
	w.engine.index().register_text(FileKey::new("s1.lore"), "property foo when-subtype Base");
	w.engine.index().register_text(FileKey::new("s2.lore"), "property bar");

	let derived = type_subject(10, "Derived", &["Base"]);
	let other = type_subject(11, "Other", &[]);
	let cancel = CancellationToken::new();

	w.engine.contribute(&QueryBuilder::new(1, &derived).build(), &cancel);
	// Same place, different subject type: s2's entry is reusable, s1's is not.
	w.engine.contribute(&QueryBuilder::new(1, &other).build(), &cancel);

	let m = w.engine.metrics();
	assert_eq!(m.cache_hits, 1);
	assert_eq!(m.cache_misses, 3);
}

#[test]
fn evaluation_panic_disables_one_script_and_spares_the_rest() {
	let w = world();
	w.engine.index().register_text(FileKey::new("a.lore"), "property one");
	w.engine.index().register_text(FileKey::new("b.lore"), "explode");
	w.engine.index().register_text(FileKey::new("c.lore"), "property three");

	let ty = type_subject(10, "Derived", &["Base"]);
	let cancel = CancellationToken::new();

	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	assert_eq!(holder.member_names(), vec!["one", "three"]);

	let key = FileKey::new("b.lore");
	assert_eq!(w.engine.activation().status(&key), ActivationStatus::DisabledError);
	assert_eq!(w.sink.script_errors.lock().as_slice(), ["b.lore"]);

	// Disabled scripts are skipped and the error is not re-reported.
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	assert_eq!(holder.member_names(), vec!["one", "three"]);
	assert_eq!(w.sink.script_errors.lock().len(), 1);
}

#[test]
fn fatal_compile_failure_freezes_all_queries() {
	let w = world();
	w.engine.index().register_text(FileKey::new("ok.lore"), "property one");
	w.engine.index().register_text(FileKey::new("bad.lore"), "fatal resource exhausted");

	let ty = type_subject(10, "T", &[]);
	let cancel = CancellationToken::new();

	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	// The fatal script contributes nothing; earlier files may have landed.
	assert!(!holder.member_names().contains(&"never"));
	assert_eq!(w.sink.fatal_stops.load(Ordering::Relaxed), 1);

	// Once stopped, every query returns empty and nothing is re-reported.
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	assert!(holder.is_empty());
	assert_eq!(w.sink.fatal_stops.load(Ordering::Relaxed), 1);
	assert_eq!(w.engine.coordinator_metrics().fatal_stops, 1);
}

#[test]
fn callback_actions_run_registered_host_code() {
	let w = world();
	w.engine.callbacks().register(CallbackId::from_raw(7), |_ctx| vec![MemberSpec::property("fromCallback", "String")]);
	w.engine.index().register_text(FileKey::new("cb.lore"), "callback 7");

	let ty = type_subject(10, "T", &[]);
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &CancellationToken::new());
	assert_eq!(holder.member_names(), vec!["fromCallback"]);
}

#[test]
fn unregistered_callback_disables_the_script() {
	let w = world();
	w.engine.index().register_text(FileKey::new("cb.lore"), "callback 99");

	let ty = type_subject(10, "T", &[]);
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &CancellationToken::new());
	assert!(holder.is_empty());
	assert_eq!(w.engine.activation().status(&FileKey::new("cb.lore")), ActivationStatus::DisabledError);
	assert_eq!(w.sink.script_errors.lock().as_slice(), ["cb.lore"]);
}

#[test]
fn cancelled_query_returns_without_touching_scripts() {
	let w = world();
	w.engine.index().register_text(FileKey::new("s1.lore"), "property foo");

	let cancel = CancellationToken::new();
	cancel.cancel();

	let ty = type_subject(10, "T", &[]);
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	assert!(holder.is_empty());
	assert_eq!(w.compiler.count("s1.lore"), 0);
}

#[test]
fn cancellation_mid_evaluation_discards_partial_results() {
	let w = world();
	w.engine.index().register_text(FileKey::new("first.lore"), "property done");
	w.engine.index().register_text(FileKey::new("second.lore"), "callback 1\nproperty late");

	// The callback cancels the query from inside the second file's first rule.
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	w.engine.callbacks().register(CallbackId::from_raw(1), move |_ctx| {
		trigger.cancel();
		vec![MemberSpec::property("early", "Object")]
	});

	let ty = type_subject(10, "T", &[]);
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
	// Completed files survive; the interrupted file's partial members do not.
	assert_eq!(holder.member_names(), vec!["done"]);

	// Nothing partial was cached: a later query evaluates the file in full.
	let holder = w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &CancellationToken::new());
	assert_eq!(holder.member_names(), vec!["done", "early", "late"]);
}

#[test]
fn compile_failure_disables_until_reactivated() {
	let w = world();
	let key = FileKey::new("broken.lore");
	w.engine.index().register_text(key.clone(), "fail missing import");

	let ty = type_subject(10, "T", &[]);
	let cancel = CancellationToken::new();

	assert!(w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel).is_empty());
	assert_eq!(w.engine.activation().status(&key), ActivationStatus::DisabledError);
	assert_eq!(w.compiler.count("broken.lore"), 1);

	// While disabled, queries never resubmit the file.
	assert!(w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel).is_empty());
	assert_eq!(w.compiler.count("broken.lore"), 1);

	// Explicit reactivation retries the compile.
	w.engine.reactivate(&key);
	assert!(w.engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel).is_empty());
	assert_eq!(w.compiler.count("broken.lore"), 2);
}

#[test]
fn non_blocking_engine_reports_absent_then_ready() {
	let compiler = support::DirectiveCompiler::new();
	let sink = Arc::new(support::RecordingSink::default());
	let engine = lore_engine::DslEngine::with_parts(
		Arc::clone(&compiler) as Arc<dyn lore_script::ScriptCompiler>,
		Arc::new(lore_script::ActivationRegistry::new()),
		sink as Arc<dyn lore_script::ErrorSink>,
		lore_engine::EngineConfig {
			non_blocking: true,
			..Default::default()
		},
	)
	.unwrap();
	engine.index().register_text(FileKey::new("s1.lore"), "property foo");

	let ty = type_subject(10, "T", &[]);
	let cancel = CancellationToken::new();

	// First query only schedules the compile.
	assert!(engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel).is_empty());
	loop {
		let holder = engine.contribute(&QueryBuilder::new(1, &ty).build(), &cancel);
		if !holder.is_empty() {
			assert_eq!(holder.member_names(), vec!["foo"]);
			break;
		}
		std::thread::yield_now();
	}
	assert_eq!(compiler.count("s1.lore"), 1);
}
