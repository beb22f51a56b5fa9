use std::cell::RefCell;
use std::rc::Rc;

use crate::host::{ByteString, Callable, Context, HostError, HostObj, Value};

/// The recorded outcome of one test case.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaseResult {
    NotRun,
    Pass,
    Fail,
}

struct TestCase {
    name: ByteString,
    func: Callable,
    result: CaseResult,
}

struct SuiteState {
    name: ByteString,
    cases: Vec<TestCase>,
    // The case currently executing, so a failed assertion knows whom to blame.
    current: Option<usize>,
}

/// A script-driven test suite.
///
/// Cases are added with [`add`], executed in insertion order by [`run`], and
/// judge themselves through [`assert`]. A failing assertion marks the
/// current case and keeps going; it never unwinds the script. [`events`]
/// pumps the Selector until the watch set empties, which is how a case waits
/// for its socket traffic to finish.
///
/// [`add`]: #method.add
/// [`run`]: #method.run
/// [`assert`]: #method.assert
/// [`events`]: #method.events
pub struct TestSuite {
    shared: Rc<RefCell<SuiteState>>,
    obj: HostObj,
}

impl TestSuite {
    /// TestSuite([name]) — create an empty suite.
    pub fn new(args: &[Value]) -> TestSuite {
        let name = match args.first() {
            Some(Value::Str(s)) => s.clone(),
            _ => ByteString::new(),
        };

        let shared = Rc::new(RefCell::new(SuiteState {
            name,
            cases: Vec::new(),
            current: None,
        }));
        let obj = HostObj::from_rc(shared.clone());

        TestSuite { shared, obj }
    }

    pub fn name(&self) -> ByteString {
        self.shared.borrow().name.clone()
    }

    /// add([name], fn) — append a test case. The name defaults to empty.
    pub fn add(&self, args: &[Value]) -> Result<(), HostError> {
        if args.is_empty() {
            return Err(HostError::NotEnoughArguments);
        }

        let (name, func) = if args.len() >= 2 {
            let name = args[0].as_str().ok_or(HostError::ArgumentNotString)?;
            (name.clone(), &args[1])
        } else {
            (ByteString::new(), &args[0])
        };

        let func = func.as_callable().ok_or(HostError::NotAFunction)?;

        self.shared.borrow_mut().cases.push(TestCase {
            name,
            func: func.clone(),
            result: CaseResult::NotRun,
        });

        Ok(())
    }

    /// assert(expected, actual) — record a comparison.
    ///
    /// Operands compare within one type arm only: integers with integers,
    /// doubles with doubles, strings byte-wise with strings, booleans with
    /// booleans. A non-empty string expectation against void fails, an empty
    /// one passes. Every other pairing is a type mismatch and fails.
    ///
    /// A failed assertion writes its diagnostic to stderr and marks the case
    /// being executed; the call itself still succeeds so the case runs on.
    pub fn assert(&self, args: &[Value]) -> Result<(), HostError> {
        if args.len() < 2 {
            return Err(HostError::NotEnoughArguments);
        }

        let matched = compare(&args[0], &args[1]);

        if !matched {
            let mut state = self.shared.borrow_mut();
            if let Some(current) = state.current {
                if let Some(case) = state.cases.get_mut(current) {
                    case.result = CaseResult::Fail;
                }
            }
        }

        Ok(())
    }

    /// events() — pump the Selector until no watches remain.
    pub fn events(&self, cx: &Context) {
        while cx.selector.pump_once(cx.host) {}
    }

    /// run() — execute every case and print the summary.
    ///
    /// Each case starts as a pass and is demoted when an assertion fails or
    /// its invocation reports failure. Fails with `FailingTestSuite` when any
    /// case failed, or `NotAllTestCasesRun` when the counts do not reconcile
    /// (a case added while running never executes).
    pub fn run(&self, cx: &Context) -> Result<(), HostError> {
        let planned = self.shared.borrow().cases.len();

        for index in 0..planned {
            let func = {
                let mut state = self.shared.borrow_mut();
                state.current = Some(index);
                state.cases[index].result = CaseResult::Pass;
                state.cases[index].func.clone()
            };

            if !cx.invoke(&self.obj, &func, &[]) {
                self.shared.borrow_mut().cases[index].result = CaseResult::Fail;
            }

            let state = self.shared.borrow();
            let case = &state.cases[index];
            match case.result {
                CaseResult::Pass => println!("PASS: {}", case.name),
                _ => println!("FAIL: {}", case.name),
            }
        }

        self.shared.borrow_mut().current = None;

        let state = self.shared.borrow();
        let total = state.cases.len();
        let pass = state
            .cases
            .iter()
            .filter(|c| c.result == CaseResult::Pass)
            .count();
        let fail = state
            .cases
            .iter()
            .filter(|c| c.result == CaseResult::Fail)
            .count();

        println!("Total: {}  Pass: {}  Fail: {}", total, pass, fail);

        if fail > 0 {
            return Err(HostError::FailingTestSuite);
        }
        if total != pass + fail {
            return Err(HostError::NotAllTestCasesRun);
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.borrow().cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pass_count(&self) -> usize {
        self.count(CaseResult::Pass)
    }

    pub fn fail_count(&self) -> usize {
        self.count(CaseResult::Fail)
    }

    /// The recorded result of every case, in insertion order.
    pub fn results(&self) -> Vec<CaseResult> {
        self.shared.borrow().cases.iter().map(|c| c.result).collect()
    }

    fn count(&self, result: CaseResult) -> usize {
        self.shared
            .borrow()
            .cases
            .iter()
            .filter(|c| c.result == result)
            .count()
    }
}

fn compare(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Int(expected), Value::Int(actual)) => {
            if expected != actual {
                eprintln!(
                    "Assertion failed:\n  Expected: {}\n  Actual  : {}",
                    expected, actual
                );
                return false;
            }
            true
        }
        (Value::Double(expected), Value::Double(actual)) => {
            if expected != actual {
                eprintln!(
                    "Assertion failed:\n  Expected: {}\n  Actual  : {}",
                    expected, actual
                );
                return false;
            }
            true
        }
        (Value::Str(expected), Value::Str(actual)) => {
            if expected.as_bytes() != actual.as_bytes() {
                eprintln!(
                    "Assertion failed:\n  Expected: \"{}\"\n  Actual  : \"{}\"",
                    expected, actual
                );
                return false;
            }
            true
        }
        (Value::Str(expected), Value::Void) => {
            if !expected.is_empty() {
                eprintln!(
                    "Assertion failed:\n  Expected: \"{}\"\n  Actual  : void",
                    expected
                );
                return false;
            }
            true
        }
        (Value::Bool(expected), Value::Bool(actual)) => {
            if expected != actual {
                eprintln!(
                    "Assertion failed:\n  Expected: {}\n  Actual  : {}",
                    expected, actual
                );
                return false;
            }
            true
        }
        _ => {
            eprintln!("Assertion failed: type mismatch");
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::compare;
    use crate::host::Value;

    #[test]
    fn same_arm_comparisons() {
        assert!(compare(&Value::Int(1), &Value::Int(1)));
        assert!(!compare(&Value::Int(1), &Value::Int(2)));
        assert!(compare(&Value::Double(1.5), &Value::Double(1.5)));
        assert!(compare(&Value::from("a"), &Value::from("a")));
        assert!(!compare(&Value::from("a"), &Value::from("b")));
        assert!(compare(&Value::Bool(true), &Value::Bool(true)));
    }

    #[test]
    fn string_against_void() {
        assert!(compare(&Value::from(""), &Value::Void));
        assert!(!compare(&Value::from("a"), &Value::Void));
    }

    #[test]
    fn mixed_types_mismatch() {
        assert!(!compare(&Value::Int(1), &Value::Double(1.0)));
        assert!(!compare(&Value::Int(1), &Value::from("1")));
        assert!(!compare(&Value::Void, &Value::Void));
        assert!(!compare(&Value::Bool(true), &Value::Int(1)));
    }
}
