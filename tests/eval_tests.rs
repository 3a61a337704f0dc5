use std::rc::Rc;

use splice::macros::MemoryLocator;
use splice::runtime::{ImportHook, Interpreter, ModuleValue, Namespace, Value};
use splice::syntax::parse_str;
use splice::{ErrorType, SourceContext, SpliceError};

fn run(text: &str) -> Result<(Namespace, Vec<String>), SpliceError> {
    let module = parse_str(text)?;
    let mut interp = Interpreter::new();
    let globals = interp.run(&module, &SourceContext::snippet(text))?;
    Ok((globals, interp.take_output()))
}

fn output(text: &str) -> Vec<String> {
    run(text).unwrap().1
}

fn error(text: &str) -> String {
    run(text).unwrap_err().message()
}

#[test]
fn builtins() {
    let out = output(
        r#"
print(len([1, 2, 3]), len("abc"), len((1,)));
print(range(3), range(1, 7, 2), range(3, 0, -1));
print(str(12) + "!", int(" 42 ") + 1, int(True));
o = object();
setattr(o, "a", 1);
print(getattr(o, "a"), getattr(o, "b", None), hasattr(o, "a"), hasattr(o, "b"));
"#,
    );
    assert_eq!(
        out,
        [
            "3 3 1",
            "[0, 1, 2] [1, 3, 5] [3, 2, 1]",
            "12! 43 1",
            "1 None True False",
        ]
    );
}

#[test]
fn containers_are_shared() {
    let out = output(
        "a = [1, 2];\nb = a;\nb[0] = 9;\ndel b[1];\nt = (a, 'x');\nprint(a, t, 'x' in t, 3 not in a);",
    );
    assert_eq!(out, ["[9] ([9], 'x') True True"]);
}

#[test]
fn boolean_operators_short_circuit() {
    let out = output("def boom() { return 1 // 0; }\nprint(0 and boom(), 1 or boom(), None or 'd');");
    assert_eq!(out, ["0 1 d"]);
}

#[test]
fn comparisons_chain() {
    let out = output("print(1 < 2 < 3, 1 < 3 < 2, 'a' < 'b', [1] == [1]);");
    assert_eq!(out, ["True False True True"]);
}

#[test]
fn closures_read_module_globals() {
    let out = output("base = 10;\ndef f(x) { return x + base; }\nbase = 20;\nprint(f(1));");
    assert_eq!(out, ["21"]);
}

#[test]
fn star_and_double_star_arguments() {
    let out = output(
        "def f(a, b, c = 0) { return a * 100 + b * 10 + c; }\nopts = object();\nopts.c = 3;\nprint(f(*[1, 2]), f(1, **opts, b = 2));",
    );
    assert_eq!(out, ["120 123"]);
}

#[test]
fn decorators_apply_bottom_up() {
    let out = output(
        "def outer(f) { return 'outer(' + f + ')'; }\ndef inner(f) { return 'inner'; }\n@outer\n@inner\ndef g() { pass; }\nprint(g);",
    );
    assert_eq!(out, ["outer(inner)"]);
}

#[test]
fn runtime_errors() {
    assert_eq!(error("x = 1 // 0;"), "division by zero");
    assert_eq!(error("x = [1][3];"), "index out of range");
    assert_eq!(error("x = 1 + 'a';"), "unsupported operand type(s) for +: 'int' and 'str'");
    assert_eq!(error("x = 1;\nx();"), "'int' object is not callable");
    assert_eq!(error("[a, b] = [1];"), "cannot unpack: expected 2 values, got 1");
    assert_eq!(error("def f(a) { pass; }\nf(1, 2);"), "f() takes 1 positional arguments but 2 were given");
    assert_eq!(error("def f(a) { pass; }\nf(b = 1);"), "f() got an unexpected keyword argument 'b'");
    assert_eq!(error("def f(a) { pass; }\nf();"), "f() missing required argument 'a'");
    assert_eq!(error("len(1, 2);"), "len() takes 1 argument(s) (2 given)");
    assert_eq!(error("x = 9223372036854775807 + 1;"), "integer overflow");
    assert_eq!(error("object().a;"), "'object' object has no attribute 'a'");

    let err = run("x = 1;\n\nundefined_name;").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Runtime);
    assert_eq!(err.line(), Some(3));
}

#[test]
fn macro_decorator_leaves_a_stub() {
    let err = run("@macro\ndef add(a, b) { a + b; }\nadd(1, 2);").unwrap_err();
    assert_eq!(err.message(), "__main__.add() is a macro; it cannot be called directly");
}

struct Recording {
    names: Rc<std::cell::RefCell<Vec<String>>>,
}

impl ImportHook for Recording {
    fn load(
        &self,
        interp: &mut Interpreter,
        module: &str,
    ) -> Option<Result<Rc<ModuleValue>, SpliceError>> {
        self.names.borrow_mut().push(module.to_string());
        if module != "virtual" {
            return None;
        }
        Some(parse_str("answer = 41 + 1;").and_then(|body| {
            interp.exec_module(&body, module, &SourceContext::from_file("virtual.spl", ""))
        }))
    }
}

#[test]
fn hook_intercepts_every_import_once() {
    let names = Rc::new(std::cell::RefCell::new(Vec::new()));
    let locator = MemoryLocator::new().with_module("real", "from virtual import answer;\nvalue = answer;");
    let mut interp = Interpreter::new().with_locator(Rc::new(locator));
    interp.install_hook(Box::new(Recording {
        names: Rc::clone(&names),
    }));

    let module = parse_str("from real import value;\nfrom virtual import answer;").unwrap();
    let globals = interp.run(&module, &SourceContext::snippet("")).unwrap();
    assert_eq!(globals["value"], Value::Int(42));
    assert_eq!(globals["answer"], Value::Int(42));
    assert_eq!(*names.borrow(), ["real", "virtual"]);
}

#[test]
fn installing_a_hook_returns_the_previous_one() {
    let names = Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut interp = Interpreter::new();
    assert!(interp
        .install_hook(Box::new(Recording { names: Rc::clone(&names) }))
        .is_none());
    assert!(interp
        .install_hook(Box::new(Recording { names: Rc::clone(&names) }))
        .is_some());
    assert!(interp.remove_hook().is_some());
    assert!(!interp.has_hook());
}

#[test]
fn circular_imports_are_reported() {
    let locator = MemoryLocator::new()
        .with_module("a", "from b import y;\nx = 1;")
        .with_module("b", "from a import x;\ny = 2;");
    let mut interp = Interpreter::new().with_locator(Rc::new(locator));
    let module = parse_str("from a import x;").unwrap();
    let err = interp.run(&module, &SourceContext::snippet("")).unwrap_err();
    assert!(err.message().contains("circular import"), "{}", err.message());
}
