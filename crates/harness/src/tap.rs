/// TAP (Test Anything Protocol) v14 output.
/// Rendered to a string; callers decide where it goes.
#[derive(Debug, Default)]
pub struct Tap {
    tests: Vec<TapTest>,
}

#[derive(Debug)]
struct TapTest {
    status: Status,
    desc: String,
    diagnostics: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    NotOk,
    Skip,
}

impl Tap {
    pub fn new() -> Self {
        Tap::default()
    }

    pub fn ok(&mut self, desc: impl Into<String>) {
        self.push(Status::Ok, desc.into(), None);
    }

    pub fn not_ok(&mut self, desc: impl Into<String>, diagnostics: impl Into<String>) {
        self.push(Status::NotOk, desc.into(), Some(diagnostics.into()));
    }

    pub fn skip(&mut self, desc: impl Into<String>) {
        self.push(Status::Skip, desc.into(), None);
    }

    fn push(&mut self, status: Status, desc: String, diagnostics: Option<String>) {
        self.tests.push(TapTest {
            status,
            desc,
            diagnostics,
        });
    }

    pub fn failure_count(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.status == Status::NotOk)
            .count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("TAP version 14\n");
        out.push_str(&format!("1..{}\n", self.tests.len()));
        let mut pass = 0usize;
        let mut skip = 0usize;
        for (i, t) in self.tests.iter().enumerate() {
            let n = i + 1;
            match t.status {
                Status::Ok => {
                    out.push_str(&format!("ok {} - {}\n", n, t.desc));
                    pass += 1;
                }
                Status::Skip => {
                    out.push_str(&format!("ok {} - {} # SKIP\n", n, t.desc));
                    skip += 1;
                }
                Status::NotOk => {
                    out.push_str(&format!("not ok {} - {}\n", n, t.desc));
                    if let Some(diag) = &t.diagnostics {
                        for line in diag.lines() {
                            out.push_str(&format!("  # {}\n", line));
                        }
                    }
                }
            }
        }
        out.push_str(&format!("# tests {}\n", self.tests.len()));
        out.push_str(&format!("# pass  {}\n", pass));
        out.push_str(&format!("# skip  {}\n", skip));
        out.push_str(&format!("# fail  {}\n", self.failure_count()));
        out
    }
}
