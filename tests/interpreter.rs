use std::{rc::Rc, thread};

use jlite::{
    class::Instance,
    diagnostics::{DiagnosticKind, JliteError},
    runtime::{ExecutionContext, Interpreter, DEFAULT_MAX_CALL_DEPTH},
    Value,
};

fn run_with(context: ExecutionContext, source: &str) -> (String, Result<(), JliteError>) {
    let mut interpreter = Interpreter::with_output(context, Vec::new());
    let result = interpreter.run_source(source);
    let output = String::from_utf8(interpreter.into_output()).expect("output is utf-8");
    (output, result)
}

fn eval(source: &str) -> String {
    let (output, result) = run_with(ExecutionContext::default(), source);
    if let Err(err) = result {
        panic!("evaluation failed: {err}\noutput so far:\n{output}");
    }
    output
}

fn eval_error(source: &str) -> (String, JliteError) {
    match run_with(ExecutionContext::default(), source) {
        (output, Err(err)) => (output, err),
        (output, Ok(())) => panic!("expected error, program printed {output:?}"),
    }
}

fn error_kind(err: &JliteError) -> DiagnosticKind {
    err.diagnostic()
        .map(|diag| diag.kind)
        .unwrap_or_else(|| panic!("expected a diagnostic, found {err}"))
}

/// Wraps statements in `Main.main`.
fn main_body(body: &str) -> String {
    format!("class Main {{\n void main() {{\n{body}\n }}\n}}\n")
}

fn lines(output: &str) -> Vec<&str> {
    output.lines().collect()
}

#[test]
fn chains_calculator_calls() {
    let output = eval(
        r#"
        class Calculator {
            int add(int a, int b) { return a + b; }
            int multiply(int a, int b) { return a * b; }
            int subtract(int a, int b) { return a - b; }
        }
        class Main {
            void main() {
                Calculator calc = new Calculator();
                int sum = calc.add(5, 3);
                System.out.println(sum);
                int product = calc.multiply(sum, 2);
                System.out.println(product);
                System.out.println(calc.subtract(product, 5));
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["8", "16", "11"]);
}

#[test]
fn counter_keeps_state_across_calls() {
    let output = eval(
        r#"
        class Counter {
            int count = 0;
            void increment() { count = count + 1; }
            void decrement() { count = count - 1; }
            int getValue() { return count; }
        }
        class Main {
            void main() {
                Counter c = new Counter();
                System.out.println(c.getValue());
                c.increment();
                c.increment();
                c.increment();
                System.out.println(c.getValue());
                c.decrement();
                System.out.println(c.getValue());
                int i = 0;
                while (i < 5) {
                    c.increment();
                    i = i + 1;
                }
                System.out.println(c.getValue());
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["0", "3", "2", "7"]);
}

#[test]
fn recursive_fibonacci() {
    let output = eval(
        r#"
        class Fibonacci {
            int calculate(int n) {
                if (n <= 1) {
                    return n;
                }
                return calculate(n - 1) + calculate(n - 2);
            }
        }
        class Main {
            void main() {
                Fibonacci fib = new Fibonacci();
                System.out.println(fib.calculate(0));
                System.out.println(fib.calculate(1));
                System.out.println(fib.calculate(5));
                System.out.println(fib.calculate(10));
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["0", "1", "5", "55"]);
}

#[test]
fn integer_arithmetic_is_exact() {
    let output = eval(&main_body(
        r#"
        System.out.println(7 / 2);
        System.out.println(-7 % 3);
        System.out.println(9223372036854775807 - 1);
        System.out.println(3037000499 * 3037000499);
        "#,
    ));
    assert_eq!(
        lines(&output),
        vec!["3", "-1", "9223372036854775806", "9223372030926249001"]
    );
}

#[test]
fn integer_overflow_wraps() {
    let output = eval(&main_body("System.out.println(9223372036854775807 + 1);"));
    assert_eq!(output.trim(), "-9223372036854775808");
}

#[test]
fn doubles_widen_mixed_operands() {
    let output = eval(&main_body(
        r#"
        System.out.println(1 + 2.5);
        System.out.println(6.0 / 4);
        System.out.println(2 * 1.5);
        System.out.println(1 < 1.5);
        System.out.println(1.0 / 3 > 0.3);
        "#,
    ));
    assert_eq!(lines(&output), vec!["3.5", "1.5", "3.0", "true", "true"]);
}

#[test]
fn string_concatenation_uses_display_forms() {
    let output = eval(
        r#"
        class Box { }
        class Main {
            void main() {
                System.out.println("x=" + 5);
                System.out.println(1.5 + " units");
                System.out.println("flag " + true + " " + null);
                System.out.println("box: " + new Box());
                System.out.println(1 + 2 + "3");
            }
        }
        "#,
    );
    assert_eq!(
        lines(&output),
        vec!["x=5", "1.5 units", "flag true null", "box: <instance of Box>", "33"]
    );
}

#[test]
fn division_by_zero_fails() {
    for expr in ["1 / 0", "1 % 0", "1.5 / 0", "4 / 0.0"] {
        let (_, err) = eval_error(&main_body(&format!("System.out.println({expr});")));
        assert_eq!(error_kind(&err), DiagnosticKind::Arithmetic, "for {expr}");
    }
}

#[test]
fn operand_type_mismatch_names_both_types() {
    let (_, err) = eval_error(&main_body("int x = true - 1;"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
    let message = err.to_string();
    assert!(message.contains("boolean"), "{message}");
    assert!(message.contains("int"), "{message}");
    assert!(message.contains("line 3"), "{message}");
}

#[test]
fn logical_operators_require_booleans() {
    let output = eval(&main_body(
        r#"
        System.out.println(true && false);
        System.out.println(false || true);
        System.out.println(!false);
        "#,
    ));
    assert_eq!(lines(&output), vec!["false", "true", "true"]);

    let (_, err) = eval_error(&main_body("boolean b = 1 && true;"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
    let (_, err) = eval_error(&main_body("boolean b = !0;"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let (output, err) = eval_error(
        r#"
        class Main {
            boolean loud() {
                System.out.println("evaluated");
                return true;
            }
            void main() {
                boolean b = false && loud();
                System.out.println(b);
                boolean c = true || 5;
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["evaluated", "false"]);
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
}

#[test]
fn equality_follows_tags_and_identity() {
    let output = eval(
        r#"
        class Thing { }
        class Main {
            void main() {
                Thing a = new Thing();
                Thing b = a;
                System.out.println(a == b);
                System.out.println(a == new Thing());
                System.out.println(null == null);
                System.out.println(a != null);
                System.out.println(1 == 1.0);
                System.out.println("hi" == "hi");
            }
        }
        "#,
    );
    assert_eq!(
        lines(&output),
        vec!["true", "false", "true", "true", "false", "true"]
    );
}

#[test]
fn block_scoping_and_shadowing() {
    let output = eval(&main_body(
        r#"
        int x = 1;
        {
            int x = 2;
            System.out.println(x);
            x = 3;
            System.out.println(x);
        }
        System.out.println(x);
        {
            x = 10;
        }
        System.out.println(x);
        "#,
    ));
    assert_eq!(lines(&output), vec!["2", "3", "1", "10"]);
}

#[test]
fn block_locals_are_not_visible_after_the_block() {
    let (output, err) = eval_error(&main_body(
        r#"
        {
            int inner = 5;
            System.out.println(inner);
        }
        System.out.println(inner);
        "#,
    ));
    assert_eq!(output, "5\n");
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
    assert!(err.to_string().contains("`inner`"));
}

#[test]
fn uninitialized_field_reads_as_null() {
    let output = eval(
        r#"
        class Counter {
            int count;
        }
        class Main {
            void main() {
                Counter c = new Counter();
                System.out.println(c.count);
                System.out.println(c.count == null);
                c.count = 4;
                System.out.println(c.count);
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["null", "true", "4"]);
}

#[test]
fn field_initializers_run_in_order_with_this() {
    let output = eval(
        r#"
        class Pair {
            int first = 2;
            int second = first * 10;
            Pair self = this;
        }
        class Main {
            void main() {
                Pair p = new Pair();
                System.out.println(p.second);
                System.out.println(p.self == p);
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["20", "true"]);
}

#[test]
fn objects_are_shared_references() {
    let output = eval(
        r#"
        class Cell {
            int value = 0;
            void set(int v) { this.value = v; }
        }
        class Main {
            void fill(Cell target) { target.set(42); }
            void main() {
                Cell a = new Cell();
                Cell b = a;
                b.value = 7;
                System.out.println(a.value);
                fill(a);
                System.out.println(b.value);
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["7", "42"]);
}

#[test]
fn undeclared_fields_are_created_on_write() {
    let output = eval(
        r#"
        class Bag { }
        class Main {
            void main() {
                Bag bag = new Bag();
                bag.extra = "added";
                System.out.println(bag.extra);
            }
        }
        "#,
    );
    assert_eq!(output, "added\n");

    let (_, err) = eval_error(
        r#"
        class Bag { }
        class Main {
            void main() {
                Bag bag = new Bag();
                System.out.println(bag.missing);
            }
        }
        "#,
    );
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
}

#[test]
fn member_access_on_non_object_is_a_type_error() {
    let (_, err) = eval_error(&main_body("int x = 3;\nSystem.out.println(x.y);"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
    let (_, err) = eval_error(
        r#"
        class Node { Node next; }
        class Main {
            void main() {
                Node n = new Node();
                n.next.next = n;
            }
        }
        "#,
    );
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
    assert!(err.to_string().contains("null"));
}

#[test]
fn methods_do_not_see_caller_locals() {
    let (_, err) = eval_error(
        r#"
        class Main {
            int peek() { return secret; }
            void main() {
                int secret = 1;
                System.out.println(peek());
            }
        }
        "#,
    );
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
}

#[test]
fn wrong_argument_count_is_an_arity_error() {
    let (_, err) = eval_error(
        r#"
        class Calculator {
            int add(int a, int b) { return a + b; }
        }
        class Main {
            void main() {
                Calculator calc = new Calculator();
                calc.add(1);
            }
        }
        "#,
    );
    assert_eq!(error_kind(&err), DiagnosticKind::Arity);
    assert!(err.to_string().contains("expects 2 argument(s) but received 1"));
}

#[test]
fn arguments_are_not_evaluated_on_arity_mismatch() {
    let (output, err) = eval_error(
        r#"
        class Main {
            int noisy() {
                System.out.println("noisy");
                return 1;
            }
            void one(int a) { }
            void main() {
                one(noisy(), noisy());
            }
        }
        "#,
    );
    assert_eq!(output, "");
    assert_eq!(error_kind(&err), DiagnosticKind::Arity);
}

#[test]
fn undefined_method_and_class_are_reported() {
    let (_, err) = eval_error(
        r#"
        class Empty { }
        class Main {
            void main() {
                Empty e = new Empty();
                e.nothing();
            }
        }
        "#,
    );
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
    assert!(err.to_string().contains("`nothing`"));

    let (_, err) = eval_error(&main_body("Ghost g = new Ghost();"));
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
    assert!(err.to_string().contains("`Ghost`"));
}

#[test]
fn new_with_arguments_is_an_arity_error() {
    let (_, err) = eval_error("class Thing { }\nclass Main { void main() { Thing t = new Thing(1); } }");
    assert_eq!(error_kind(&err), DiagnosticKind::Arity);
}

#[test]
fn println_takes_exactly_one_argument() {
    let (_, err) = eval_error(&main_body("System.out.println(1, 2);"));
    assert_eq!(error_kind(&err), DiagnosticKind::Arity);
    let (_, err) = eval_error(&main_body("System.out.println();"));
    assert_eq!(error_kind(&err), DiagnosticKind::Arity);
}

#[test]
fn println_needs_the_exact_dotted_path() {
    let (_, err) = eval_error(&main_body("System.err.println(1);"));
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
}

#[test]
fn missing_return_yields_type_default() {
    let output = eval(
        r#"
        class Defaults {
            int number() { }
            double real() { }
            boolean flag() { }
            Defaults object() { }
            void nothing() { }
        }
        class Main {
            void main() {
                Defaults d = new Defaults();
                System.out.println(d.number());
                System.out.println(d.real());
                System.out.println(d.flag());
                System.out.println(d.object());
                System.out.println(d.nothing());
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["0", "0.0", "false", "null", "void"]);
}

#[test]
fn return_unwinds_nested_loops() {
    let output = eval(
        r#"
        class Search {
            int firstOver(int limit) {
                for (int i = 1; i < 100; i = i + 1) {
                    int j = 1;
                    while (j <= i) {
                        if (i * j > limit) {
                            return i * j;
                        }
                        j = j + 1;
                    }
                }
                return -1;
            }
        }
        class Main {
            void main() {
                Search s = new Search();
                System.out.println(s.firstOver(0));
                System.out.println(s.firstOver(50));
                System.out.println(s.firstOver(100000));
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["1", "56", "-1"]);
}

#[test]
fn for_loop_runs_increment_every_iteration() {
    let output = eval(&main_body(
        r#"
        int total = 0;
        for (int i = 1; i <= 4; i = i + 1) {
            total = total + i;
        }
        System.out.println(total);
        int k = 0;
        for (; k < 3;) k = k + 1;
        System.out.println(k);
        "#,
    ));
    assert_eq!(lines(&output), vec!["10", "3"]);
}

#[test]
fn for_initializer_is_scoped_to_the_loop() {
    let (_, err) = eval_error(&main_body(
        "for (int i = 0; i < 1; i = i + 1) { }\nSystem.out.println(i);",
    ));
    assert_eq!(error_kind(&err), DiagnosticKind::UndefinedName);
}

#[test]
fn conditions_must_be_boolean() {
    let (_, err) = eval_error(&main_body("if (1) { }"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
    assert!(err.to_string().contains("`if` condition"));
    let (_, err) = eval_error(&main_body("while (null) { }"));
    assert_eq!(error_kind(&err), DiagnosticKind::Type);
}

#[test]
fn partial_output_survives_a_failure() {
    let (output, err) = eval_error(&main_body(
        r#"
        System.out.println("before");
        System.out.println(1 / 0);
        System.out.println("after");
        "#,
    ));
    assert_eq!(output, "before\n");
    assert_eq!(error_kind(&err), DiagnosticKind::Arithmetic);
}

#[test]
fn runaway_recursion_exhausts_the_stack() {
    let context = ExecutionContext {
        max_call_depth: 24,
        ..ExecutionContext::default()
    };
    let (_, result) = run_with(
        context,
        r#"
        class Main {
            int down(int n) { return down(n + 1); }
            void main() { down(0); }
        }
        "#,
    );
    let err = result.expect_err("recursion should be cut off");
    let diagnostic = err.diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::StackExhaustion);
    assert!(!diagnostic.kind.is_language_error());
}

#[test]
fn recursion_within_the_limit_succeeds() {
    let context = ExecutionContext {
        max_call_depth: 24,
        ..ExecutionContext::default()
    };
    let (output, result) = run_with(
        context,
        r#"
        class Main {
            int depth(int n) {
                if (n == 0) { return 0; }
                return 1 + depth(n - 1);
            }
            void main() { System.out.println(depth(20)); }
        }
        "#,
    );
    result.expect("within limit");
    assert_eq!(output, "20\n");
}

const RUNAWAY: &str = r#"
    class Main {
        int f(int n) { return f(n + 1); }
        void main() { f(0); }
    }
"#;

#[test]
fn default_call_depth_limit_is_reported() {
    let (_, result) = run_with(ExecutionContext::default(), RUNAWAY);
    let err = result.expect_err("recursion should be cut off");
    let diagnostic = err.diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::StackExhaustion);
    assert!(diagnostic
        .message
        .contains(&format!("maximum call depth of {DEFAULT_MAX_CALL_DEPTH} exceeded")));
}

#[test]
fn call_depth_limit_holds_on_a_small_thread_stack() {
    let handle = thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let (_, result) = run_with(ExecutionContext::default(), RUNAWAY);
            result
                .err()
                .and_then(|err| err.diagnostic().map(|diag| diag.kind))
        })
        .expect("spawn thread");
    assert_eq!(
        handle.join().expect("no stack overflow"),
        Some(DiagnosticKind::StackExhaustion)
    );
}

#[test]
fn deeply_nested_expressions_evaluate() {
    let depth = 200;
    let source = format!(
        "class Main {{ void main() {{ System.out.println({}1{}); }} }}",
        "(1 + ".repeat(depth),
        ")".repeat(depth)
    );
    let handle = thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(move || run_with(ExecutionContext::default(), &source))
        .expect("spawn thread");
    let (output, result) = handle.join().expect("no stack overflow");
    result.expect("program runs");
    assert_eq!(output, format!("{}\n", depth + 1));
}

#[test]
fn top_level_code_runs_before_main() {
    let output = eval(
        r#"
        int base = 40;
        System.out.println("setup");
        base = base + 1;
        class Main {
            void main() {
                System.out.println(base + 1);
                base = 0;
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["setup", "42"]);
}

#[test]
fn locals_shadow_fields() {
    let output = eval(
        r#"
        class Main {
            int value = 1;
            void main() {
                int value = 2;
                System.out.println(value);
                System.out.println(this.value);
                value = 3;
                System.out.println(this.value);
            }
        }
        "#,
    );
    assert_eq!(lines(&output), vec!["2", "1", "1"]);
}

#[test]
fn later_class_declaration_wins() {
    let output = eval(
        r#"
        class Greeter { void hello() { System.out.println("first"); } }
        class Greeter { void hello() { System.out.println("second"); } }
        class Main {
            void main() { new Greeter().hello(); }
        }
        "#,
    );
    assert_eq!(output, "second\n");
}

#[test]
fn missing_entry_point_is_a_startup_error() {
    let (_, err) = eval_error("class Other { void main() { } }");
    assert_eq!(error_kind(&err), DiagnosticKind::Startup);
    let (_, err) = eval_error("class Main { void start() { } }");
    assert_eq!(error_kind(&err), DiagnosticKind::Startup);
    let (_, err) = eval_error("class Main { void main(int argc) { } }");
    assert_eq!(error_kind(&err), DiagnosticKind::Startup);
}

#[test]
fn custom_entry_point() {
    let context = ExecutionContext {
        entry_class: "App".into(),
        entry_method: "start".into(),
        ..ExecutionContext::default()
    };
    let (output, result) = run_with(
        context,
        r#"class App { void start() { System.out.println("started"); } }"#,
    );
    result.expect("custom entry runs");
    assert_eq!(output, "started\n");
}

#[test]
fn parse_errors_refuse_to_run() {
    let (output, err) = eval_error(
        r#"
        class Main {
            void main() {
                System.out.println("unreachable");
                int x = ;
            }
        }
        "#,
    );
    assert_eq!(output, "");
    let JliteError::Rejected(diagnostics) = &err else {
        panic!("expected rejection, found {err}");
    };
    assert!(diagnostics.iter().all(|diag| diag.kind.is_compile_time()));
}

#[test]
fn interpreter_exposes_registered_state() {
    let mut interpreter = Interpreter::with_output(ExecutionContext::default(), Vec::new());
    interpreter
        .run_source(
            "int answer = 42;\ndouble ratio = 0.5;\nString name = \"jlite\";\nclass Main { void main() { } }",
        )
        .expect("program runs");
    assert_eq!(
        interpreter.global("answer").and_then(|value| value.as_int()),
        Some(42)
    );
    assert_eq!(
        interpreter.global("ratio").and_then(|value| value.as_double()),
        Some(0.5)
    );
    assert_eq!(
        interpreter.global("name").as_ref().and_then(|value| value.as_str()),
        Some("jlite")
    );
    assert_eq!(interpreter.context().entry_class, "Main");
    let class = interpreter.class("Main").expect("Main registered");
    assert!(class.find_method("main").is_some());
}

#[test]
fn fresh_instances_hold_null_fields_in_declaration_order() {
    let mut interpreter = Interpreter::with_output(ExecutionContext::default(), Vec::new());
    interpreter
        .run_source("class Pair { int left; Pair right; }\nclass Main { void main() { } }")
        .expect("program runs");
    let class = interpreter.class("Pair").expect("Pair registered");
    let instance = Instance::new(Rc::clone(class));
    let fields: Vec<_> = class.fields.keys().map(String::as_str).collect();
    assert_eq!(fields, vec!["left", "right"]);
    assert_eq!(instance.get("left"), Some(Value::null()));
    assert_eq!(instance.get("right"), Some(Value::null()));
    assert!(!instance.has_field("missing"));
}
