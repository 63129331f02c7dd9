//! Node input harness
//!
//! Node has no synchronous stdin primitive that cooperates with streamed
//! execution, so user code is wrapped in a shim that exposes a global
//! `input(prompt)` backed by readline. The shim installs forced-exit
//! handlers and its own safety timeout so the child cannot outlive the
//! engine's hard ceiling.

/// Safety-net budget inside the wrapper; matches the engine's hard ceiling.
const FORCE_EXIT_MILLIS: u64 = 300_000;

const NODE_WRAPPER_TEMPLATE: &str = r#"const readline = require('readline');
const rl = readline.createInterface({ input: process.stdin, output: process.stdout });
let isRlClosed = false;

function input(prompt) {
    if (isRlClosed) return Promise.resolve('');
    return new Promise((resolve) => {
        rl.question(prompt, (answer) => { resolve(answer); });
    });
}
global.input = input;

function cleanup(exitCode = 0) {
    if (!isRlClosed) {
        try { rl.close(); } catch {}
        isRlClosed = true;
    }
    if (process.stdin.readable && !process.stdin.destroyed) {
        try { process.stdin.destroy(); } catch {}
    }
    process.exit(exitCode);
}

process.on('SIGINT', () => cleanup(130));
process.on('SIGTERM', () => cleanup(143));

(async function main() {
    let exitCode = 0;
    try {
__USER_CODE__
    } catch (error) {
        console.error('Execution Error:', error);
        exitCode = 1;
    } finally {
        setTimeout(() => cleanup(exitCode), 150);
    }
})();

const forceExitTimeout = setTimeout(() => {
    console.error('Execution timed out after __TIMEOUT_SECS__ seconds. Forcing exit.');
    cleanup(124);
}, __TIMEOUT_MILLIS__);

process.on('exit', () => clearTimeout(forceExitTimeout));
"#;

/// Wrap user code in the input harness.
///
/// Code that already drives readline itself is passed through untouched so
/// the shim does not fight the program for stdin.
pub fn wrap_node_harness(code: &str) -> String {
    if code.contains("readline.createInterface") && code.contains("question") {
        return code.to_owned();
    }

    NODE_WRAPPER_TEMPLATE
        .replace("__USER_CODE__", &indent(code, "        "))
        .replace("__TIMEOUT_MILLIS__", &FORCE_EXIT_MILLIS.to_string())
        .replace("__TIMEOUT_SECS__", &(FORCE_EXIT_MILLIS / 1000).to_string())
}

fn indent(code: &str, prefix: &str) -> String {
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
