use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::anyhow;
use rigger_engine::{
    Diagnostics, OutputContext, PipelineError, StepError, StepPipeline, StepRegistry, resolve::ResolutionError,
};
use rigger_util::{InMemoryReferenceStore, StaticEnvironment};
use serde_json::{Map as JsonMap, Value, json};

type Printed = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn echo(parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics) -> anyhow::Result<Value> {
    Ok(Value::Object(parameters))
}

fn recording_sink(printed: &Printed, reject_styles: bool) -> impl Fn(&str, Option<&str>) -> anyhow::Result<()> + Send + Sync + '_ {
    move |message: &str, style: Option<&str>| -> anyhow::Result<()> {
        printed
            .lock()
            .expect("lock")
            .push((message.to_string(), style.map(str::to_string)));
        if reject_styles && style.is_some() {
            return Err(anyhow!("styled output is not supported"));
        }
        Ok(())
    }
}

fn counting_registry(calls: &Arc<AtomicUsize>) -> StepRegistry {
    let mut registry = StepRegistry::new();
    let counter = Arc::clone(calls);
    registry.register_blocking(
        "test.steps.count",
        move |parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics| -> anyhow::Result<Value> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Object(parameters))
        },
    );
    registry.register_blocking(
        "test.steps.warn",
        |_parameters: JsonMap<String, Value>, diagnostics: &mut Diagnostics| -> anyhow::Result<Value> {
            diagnostics.deprecate("this is a warning");
            Ok(json!({}))
        },
    );
    registry.register_blocking("test.steps.echo", echo);
    registry
}

fn pipeline(registry: StepRegistry) -> StepPipeline {
    StepPipeline::new(Arc::new(registry))
        .with_environment(Arc::new(StaticEnvironment::new().with_var("TEST_ENV_VAR", "test_value")))
        .with_reference_store(Arc::new(
            InMemoryReferenceStore::new()
                .with_block("secret", "test-secret", json!({"value": "echo 'I am a secret!'"}))
                .with_block("mockgitcredentials", "my-credentials", json!({"value": {"username": "marvin42", "password": "hunter2"}}))
                .with_variable("test_variable_1", json!("test_value_1"))
                .with_variable("test_variable_2", json!("test_value_2")),
        ))
}

#[tokio::test]
async fn run_step_resolves_every_namespace() {
    let pipeline = pipeline(counting_registry(&Arc::default()));

    let output = pipeline
        .run_step(
            &json!({"test.steps.echo": {
                "secret": "{{ store.blocks.secret.test-secret }}",
                "variables": "echo '{{ store.variables.test_variable_1 }}:{{ store.variables.test_variable_2 }}'",
                "env": "{{ $TEST_ENV_VAR }}",
                "unset": "{{ $NOT_SET_ANYWHERE }}",
                "credentials": "{{ store.blocks.mockgitcredentials.my-credentials }}",
                "escaped": "\\{{ not.resolved }}"
            }}),
            None,
        )
        .await
        .expect("step runs");

    assert_eq!(
        output,
        json!({
            "secret": "echo 'I am a secret!'",
            "variables": "echo 'test_value_1:test_value_2'",
            "env": "test_value",
            "unset": "$NOT_SET_ANYWHERE",
            "credentials": {"username": "marvin42", "password": "hunter2"},
            "escaped": "{{ not.resolved }}"
        })
    );
}

#[tokio::test]
async fn run_step_strips_reserved_parameters() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let output = pipeline
        .run_step(&json!({"test.steps.echo": {"id": "first", "requires": "acme-steps", "value": 1}}), None)
        .await
        .expect("step runs");
    assert_eq!(output, json!({"value": 1}));
}

#[tokio::test]
async fn run_step_rejects_malformed_entries() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let error = pipeline
        .run_step(&json!({"test.steps.echo": {}, "test.steps.count": {}}), None)
        .await
        .expect_err("two keys");
    assert!(matches!(error, StepError::Format(_)));
    assert!(error.to_string().contains("unexpected"));
}

#[tokio::test]
async fn run_steps_threads_outputs_between_steps() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(counting_registry(&calls));
    let printed = Printed::default();

    let outputs = pipeline
        .run_steps(
            &[
                json!({"test.steps.count": {"id": "why_not_to_panic", "stdout": "this is a test", "stderr": ""}}),
                json!({"test.steps.count": {"stdout": "Don't Panic: {{ why_not_to_panic.stdout }}", "stderr": ""}}),
            ],
            None,
            &recording_sink(&printed, false),
        )
        .await
        .expect("pipeline runs");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        Value::Object(outputs.merged()),
        json!({
            "why_not_to_panic": {"stdout": "this is a test", "stderr": ""},
            "stdout": "Don't Panic: this is a test",
            "stderr": ""
        })
    );
    assert!(
        printed
            .lock()
            .expect("lock")
            .contains(&(" > Running count step...".to_string(), None))
    );
}

#[tokio::test]
async fn bare_references_see_the_latest_root_value() {
    let pipeline = pipeline(counting_registry(&Arc::new(AtomicUsize::new(0))));

    let outputs = pipeline
        .run_steps(
            &[
                json!({"test.steps.echo": {"id": "a", "stdout": "first", "stderr": "kept"}}),
                json!({"test.steps.echo": {"stdout": "second"}}),
                json!({"test.steps.echo": {"id": "c", "latest": "{{ stdout }}", "tagged": "{{ a.stdout }}", "error": "{{ stderr }}"}}),
            ],
            None,
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect("pipeline runs");

    assert_eq!(
        outputs.step_output("c"),
        Some(&json!({"latest": "second", "tagged": "first", "error": "kept"}))
    );
    assert_eq!(outputs.merged().get("stdout"), Some(&json!("second")));
}

#[tokio::test]
async fn run_steps_stops_at_unknown_steps() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(counting_registry(&calls));
    let printed = Printed::default();

    let error = pipeline
        .run_steps(
            &[
                json!({"test.steps.count": {"id": "first"}}),
                json!({"nonexistent.module": {"requires": "acme-steps"}}),
                json!({"test.steps.count": {"id": "third"}}),
            ],
            None,
            &recording_sink(&printed, false),
        )
        .await
        .expect_err("unknown step");

    let execution_error = match error {
        PipelineError::Step(execution_error) => execution_error,
        other => panic!("expected a step failure, got {other:?}"),
    };
    assert_eq!(execution_error.index, 1);
    assert_eq!(execution_error.name, "nonexistent.module");
    assert!(execution_error.to_string().contains("nonexistent.module"));
    assert!(matches!(execution_error.source, StepError::UnknownStep { .. }));
    assert!(execution_error.source.to_string().contains("acme-steps"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_steps_wraps_resolution_failures() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let error = pipeline
        .run_steps(
            &[json!({"test.steps.echo": {"value": "{{ step_output_1 }}"}})],
            None,
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect_err("unresolved placeholder");

    let execution_error = match error {
        PipelineError::Step(execution_error) => execution_error,
        other => panic!("expected a step failure, got {other:?}"),
    };
    assert_eq!(execution_error.index, 0);
    assert!(matches!(
        execution_error.source,
        StepError::Resolution(ResolutionError::Unresolved { .. })
    ));
    assert!(execution_error.source.to_string().contains("step_output_1"));
}

#[tokio::test]
async fn run_steps_validates_every_entry_before_running() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(counting_registry(&calls));

    let error = pipeline
        .run_steps(
            &[
                json!({"test.steps.count": {}}),
                json!({"test.steps.count": {}, "test.steps.echo": {}}),
            ],
            None,
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect_err("malformed entry");

    assert!(matches!(error, PipelineError::Format { index: 1, .. }));
    assert!(error.to_string().contains("unexpected"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_steps_prints_diagnostics_with_style() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let printed = Printed::default();

    pipeline
        .run_steps(
            &[json!({"test.steps.warn": {"id": "why_not_to_panic"}})],
            None,
            &recording_sink(&printed, false),
        )
        .await
        .expect("pipeline runs");

    let printed = printed.lock().expect("lock");
    assert_eq!(
        *printed,
        vec![
            (" > Running warn step...".to_string(), None),
            ("this is a warning".to_string(), Some("yellow".to_string())),
        ]
    );
}

#[tokio::test]
async fn run_steps_can_print_warnings_without_style() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let printed = Printed::default();

    pipeline
        .run_steps(&[json!({"test.steps.warn": {}})], None, &recording_sink(&printed, true))
        .await
        .expect("pipeline runs");

    assert!(
        printed
            .lock()
            .expect("lock")
            .contains(&("this is a warning".to_string(), None))
    );
}

#[tokio::test]
async fn deprecated_aliases_run_the_current_step_and_warn() {
    let mut registry = counting_registry(&Arc::default());
    registry.register_blocking(
        "rigger.steps.git_clone",
        |_parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics| -> anyhow::Result<Value> {
            Ok(json!({"directory": "repo"}))
        },
    );
    registry.register_alias("rigger.projects.steps.git_clone_project", "rigger.steps.git_clone");
    let pipeline = pipeline(registry);

    let output = pipeline
        .run_step(
            &json!({"rigger.projects.steps.git_clone_project": {"repository": "https://github.com/org/repo.git"}}),
            None,
        )
        .await
        .expect("alias runs");
    assert_eq!(output, json!({"directory": "repo"}));

    let printed = Printed::default();
    pipeline
        .run_steps(
            &[json!({"rigger.projects.steps.git_clone_project": {"repository": "https://github.com/org/repo.git"}})],
            None,
            &recording_sink(&printed, false),
        )
        .await
        .expect("alias runs");
    let printed = printed.lock().expect("lock");
    assert_eq!(printed[0], (" > Running git_clone_project step...".to_string(), None));
    assert!(printed[1].0.contains("rigger.steps.git_clone"));
    assert_eq!(printed[1].1.as_deref(), Some("yellow"));
}

#[tokio::test]
async fn step_ids_feed_later_directories() {
    let captured = Arc::new(Mutex::new(None));
    let mut registry = StepRegistry::new();
    registry.register_blocking(
        "rigger.steps.git_clone",
        |_parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics| -> anyhow::Result<Value> {
            Ok(json!({"directory": "hello-projects"}))
        },
    );
    let sink = Arc::clone(&captured);
    registry.register_blocking(
        "rigger.steps.pip_install_requirements",
        move |parameters: JsonMap<String, Value>, _diagnostics: &mut Diagnostics| -> anyhow::Result<Value> {
            *sink.lock().expect("lock") = parameters.get("directory").cloned();
            Ok(json!({"stdout": "", "stderr": ""}))
        },
    );

    let outputs = pipeline(registry)
        .run_steps(
            &[
                json!({"rigger.steps.git_clone": {
                    "id": "clone-step",
                    "repository": "https://github.com/org/hello-projects.git"
                }}),
                json!({"rigger.steps.pip_install_requirements": {
                    "id": "pip-install-step",
                    "directory": "{{ clone-step.directory }}",
                    "requirements_file": "requirements.txt"
                }}),
            ],
            None,
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect("pipeline runs");

    assert_eq!(*captured.lock().expect("lock"), Some(json!("hello-projects")));
    assert_eq!(
        Value::Object(outputs.into_merged()),
        json!({
            "clone-step": {"directory": "hello-projects"},
            "directory": "hello-projects",
            "pip-install-step": {"stdout": "", "stderr": ""},
            "stdout": "",
            "stderr": ""
        })
    );
}

#[tokio::test]
async fn seeded_context_is_reachable_by_bare_and_dotted_references() {
    let pipeline = pipeline(counting_registry(&Arc::default()));
    let mut seed = JsonMap::new();
    seed.insert("image".into(), json!({"name": "api", "tag": "v1"}));
    seed.insert("region".into(), json!("us"));

    let outputs = pipeline
        .run_steps(
            &[json!({"test.steps.echo": {"id": "tagged", "ref": "{{ image.name }}:{{ image.tag }}", "region": "{{ region }}"}})],
            Some(OutputContext::seeded(seed)),
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect("pipeline runs");

    assert_eq!(
        outputs.step_output("tagged"),
        Some(&json!({"ref": "api:v1", "region": "us"}))
    );
}

#[cfg(unix)]
#[tokio::test]
async fn builtin_shell_steps_chain_outputs() {
    let pipeline = StepPipeline::new(Arc::new(StepRegistry::with_builtin_steps()));
    let outputs = pipeline
        .run_steps(
            &[
                json!({"rigger.steps.run_shell_script": {
                    "id": "why_not_to_panic",
                    "script": "echo 'this is a test'",
                    "stream_output": false
                }}),
                json!({"rigger.steps.run_shell_script": {
                    "script": "echo \"Don't Panic: {{ why_not_to_panic.stdout }}\"",
                    "stream_output": false
                }}),
            ],
            None,
            &recording_sink(&Printed::default(), false),
        )
        .await
        .expect("pipeline runs");

    assert_eq!(
        Value::Object(outputs.merged()),
        json!({
            "why_not_to_panic": {"stdout": "this is a test", "stderr": ""},
            "stdout": "Don't Panic: this is a test",
            "stderr": ""
        })
    );
}
