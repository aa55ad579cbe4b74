/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use soil::host::{FileReader, MockFileReader};
use soil::{assemble, Container, Interpreter, State};
use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

fn run(source: &str, argv: Vec<Vec<u8>>) -> Interpreter {
    let bytes = assemble(source).unwrap();
    let container = Container::parse(&bytes).unwrap();
    let mut vm = Interpreter::new(container, argv);
    vm.run();
    vm
}

/// An owned, clonable `Write` sink that stashes everything written to it,
/// so a test can inspect it after handing the other clone to the VM.
#[derive(Clone, Default)]
struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl io::Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn mock_reader_round_trips_a_source_file_into_a_container() {
    let mut reader = MockFileReader::default();
    reader.add_file("hello.soilasm", "nop\n");
    let source = reader.read_to_string(Path::new("hello.soilasm")).unwrap();

    let bytes = assemble(&source).unwrap();
    let container = Container::parse(&bytes).unwrap();
    assert_eq!(container.code, vec![0x00]);
}

fn echo_program() -> &'static str {
    // Reads argv[0] into memory at 0, prints it, and exits 0.
    "\
        moveib a 0\n\
        movei b 0\n\
        movei c 64\n\
        syscall 10\n\
        move d a\n\
        movei a 0\n\
        move b d\n\
        syscall 1\n\
        moveib a 0\n\
        syscall 0\n\
    "
}

#[test]
fn echo_via_syscalls_copies_an_argument_into_a_print_buffer() {
    let bytes = assemble(echo_program()).unwrap();
    let container = Container::parse(&bytes).unwrap();
    let stdout = CapturedOutput::default();
    let mut vm = Interpreter::new_with_output(
        container,
        vec![b"hello".to_vec()],
        Box::new(stdout.clone()),
        Box::new(io::sink()),
    );
    vm.run();
    assert!(matches!(vm.state(), State::Halted(0)));
    assert_eq!(stdout.0.borrow().as_slice(), b"hello");
}

#[test]
fn division_by_zero_traps_without_touching_memory() {
    let vm = run("movei a 1\nmovei b 0\ndiv a b\n", Vec::new());
    assert!(matches!(vm.state(), State::Trapped(_)));
}

#[test]
fn unknown_opcode_traps() {
    let container = Container {
        code: vec![0x7f],
        initial_memory: Vec::new(),
        debug_labels: Vec::new(),
    };
    let mut vm = Interpreter::new(container, Vec::new());
    vm.run();
    assert!(matches!(vm.state(), State::Trapped(_)));
}

#[test]
fn container_round_trip_preserves_debug_labels_as_a_set() {
    let source = "outer:\n.inner:\njump ..other\n.other:\n";
    let bytes = assemble(source).unwrap();
    let container = Container::parse(&bytes).unwrap();

    let names: std::collections::HashSet<_> =
        container.debug_labels.iter().map(|l| l.name.clone()).collect();
    let expected: std::collections::HashSet<_> =
        ["outer", "outer.inner", "outer.other"].into_iter().map(String::from).collect();
    assert_eq!(names, expected);
}

#[test]
fn cli_round_trip_matches_in_process_assemble_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("foo.soilasm");
    let source = echo_program();
    std::fs::write(&source_path, source).unwrap();

    let asm_status = Command::new(env!("CARGO_BIN_EXE_soilasm"))
        .arg(&source_path)
        .status()
        .unwrap();
    assert!(asm_status.success());

    let container_path = dir.path().join("foo.soil");
    assert!(container_path.exists());

    let run_output = Command::new(env!("CARGO_BIN_EXE_soil"))
        .arg(&container_path)
        .arg("hello")
        .output()
        .unwrap();

    let vm = run(source, vec![b"hello".to_vec()]);
    let State::Halted(expected_code) = vm.state() else {
        panic!("expected the in-process run to halt");
    };

    assert_eq!(run_output.status.code(), Some(*expected_code as i32));
    assert_eq!(run_output.stdout, b"hello");
}

