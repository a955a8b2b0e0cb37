// The library side of the plugin ABI, exported from this test crate.
use std::ffi::{CStr, c_char};
use std::ptr;

use psqlx::core::error::Error;
use psqlx::core::result::BackslashResult;
use psqlx::host::CommandContext;
use psqlx::plugin::export::ExportedStrings;
use psqlx::plugin::loader::parse_command_list;
use psqlx::plugin::{MetaCommand, PLUGIN_ABI_VERSION, Plugin};

struct Hello;

impl MetaCommand for Hello {
    fn name(&self) -> &str {
        "hello"
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        ctx.query_buf.replace("select 'hello';")?;
        Ok(BackslashResult::NewEdit)
    }
}

struct Bye;

impl MetaCommand for Bye {
    fn name(&self) -> &str {
        "bye"
    }

    fn execute(&self, _ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        Ok(BackslashResult::Terminate)
    }
}

struct Greeter {
    name: &'static str,
    commands: Vec<Box<dyn MetaCommand>>,
}

impl Greeter {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: vec![Box::new(Hello), Box::new(Bye)],
        }
    }
}

impl Plugin for Greeter {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "1.2.3"
    }

    fn meta_commands(&self) -> &[Box<dyn MetaCommand>] {
        &self.commands
    }
}

psqlx::export_plugin!(Greeter::new("greeter"));

fn read(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .expect("utf8")
        .to_string()
}

fn execute(cmd: *const c_char) -> i32 {
    unsafe {
        psqlx_plugin_execute(
            cmd,
            ptr::null_mut(),
            true,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    }
}

#[test]
fn exports_abi_version_and_metadata() {
    assert_eq!(psqlx_plugin_abi_version(), PLUGIN_ABI_VERSION);
    assert_eq!(read(psqlx_plugin_name()), "greeter");
    assert_eq!(read(psqlx_plugin_version()), "1.2.3");
    assert_eq!(read(psqlx_plugin_meta_commands()), "hello,bye");
    assert_eq!(
        parse_command_list(&read(psqlx_plugin_meta_commands())),
        ["hello", "bye"]
    );
}

#[test]
fn exported_strings_are_stable() {
    assert_eq!(psqlx_plugin_name(), psqlx_plugin_name());
    assert_eq!(psqlx_plugin_meta_commands(), psqlx_plugin_meta_commands());
}

#[test]
fn execute_ignores_commands_it_does_not_own() {
    assert_eq!(execute(ptr::null()), BackslashResult::Unknown.as_raw());
    assert_eq!(execute(c"missing".as_ptr()), BackslashResult::Unknown.as_raw());
}

#[test]
fn execute_without_psql_symbols_reports_error() {
    assert_eq!(execute(c"hello".as_ptr()), BackslashResult::Error.as_raw());
}

#[test]
fn interior_nul_in_metadata_exports_empty_string() {
    let strings = ExportedStrings::new(&Greeter::new("bad\0name"));
    assert_eq!(read(strings.name()), "");
    assert_eq!(read(strings.commands()), "hello,bye");
}
