//! Integration tests for records, text and arrays crossing the bridge.

mod common;

use common::{emulator, jump, load, ret};
use mtemu_bridge::{runtime::exception_type, Call, Command, Error, MapCall, Result};

#[test]
fn test_words_fidelity() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    let command = Command::new(false, 3, vec![1, 2, 3, 4, 5]);

    assert!(emulator.add_command(0, &command)?);
    let back = emulator.command(0)?;
    assert_eq!(back.words, vec![1, 2, 3, 4, 5]);
    assert_eq!(back, command);
    assert_eq!(emulator.environment().object_count()?, 1);
    Ok(())
}

#[test]
fn test_words_length_is_not_assumed() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    let long: Vec<i32> = (0..300).collect();
    let commands = [
        Command::new(false, 0, Vec::new()),
        Command::new(false, 1, vec![9]),
        Command::new(true, 2, long.clone()),
    ];
    common::program(&mut emulator, &commands)?;

    assert_eq!(emulator.command(0)?.words, Vec::<i32>::new());
    assert_eq!(emulator.command(1)?.words, vec![9]);
    assert_eq!(emulator.command(2)?.words, long);
    assert_eq!(emulator.last_command()?, commands[2]);
    Ok(())
}

#[test]
fn test_engine_may_keep_argument_objects() -> Result<()> {
    let (_host, mut emulator) = common::holding_emulator()?;
    let command = Command::new(false, 3, vec![1, 2, 3]);

    assert!(emulator.add_command(0, &command)?);
    // emulator, held command and its words
    assert_eq!(emulator.environment().object_count()?, 3);
    assert_eq!(emulator.command(0)?, command);
    assert_eq!(emulator.command(0)?, command);
    assert_eq!(emulator.environment().object_count()?, 3);

    // the replaced command is no longer reachable
    let updated = Command::new(true, 9, vec![42]);
    assert!(emulator.update_command(0, &updated)?);
    assert_eq!(emulator.command(0)?, updated);
    assert_eq!(emulator.environment().object_count()?, 3);
    Ok(())
}

#[test]
fn test_add_then_update() -> Result<()> {
    let (_host, mut emulator) = emulator()?;

    assert!(emulator.add_command(0, &Command::new(false, 7, vec![]))?);
    assert!(emulator.update_command(0, &Command::new(true, 9, vec![42]))?);

    let back = emulator.command(0)?;
    assert_eq!(back, Command::new(true, 9, vec![42]));
    assert_eq!(emulator.commands_count()?, 1);
    Ok(())
}

#[test]
fn test_remove_command_passes_engine_result_through() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    common::program(&mut emulator, &[load(1, 1), load(2, 2)])?;

    // the engine reports false even though it removed the command
    assert!(!emulator.remove_command(0)?);
    assert_eq!(emulator.commands_count()?, 1);
    assert_eq!(emulator.command(0)?, load(2, 2));
    Ok(())
}

#[test]
fn test_out_of_range_index_is_a_foreign_exception() -> Result<()> {
    let (_host, mut emulator) = emulator()?;

    match emulator.command(0) {
        Err(Error::ForeignException(exception)) => {
            assert!(exception.is(exception_type::ARGUMENT_OUT_OF_RANGE));
        }
        other => panic!("expected a foreign exception, got {other:?}"),
    }
    assert!(matches!(
        emulator.add_command(5, &load(1, 1)),
        Err(Error::ForeignException(_))
    ));

    // the instance stays usable
    assert!(emulator.add_command(0, &load(1, 1))?);
    assert_eq!(emulator.environment().object_count()?, 1);
    Ok(())
}

#[test]
fn test_command_names() -> Result<()> {
    let (_host, emulator) = emulator()?;

    assert_eq!(emulator.command_name(&Command::new(false, 12, vec![1, 4]))?, "12 JUMP");
    assert_eq!(emulator.command_jump_name(&jump(4))?, "JMP 4");
    assert_eq!(emulator.command_jump_name(&ret())?, "RET");
    assert_eq!(
        emulator.command_jump_name(&Command::new(true, 0, vec![0]))?,
        "OFFSET"
    );
    assert_eq!(emulator.command_name(&Command::default())?, "0 ?");
    assert_eq!(emulator.environment().object_count()?, 1);
    Ok(())
}

#[test]
fn test_calls() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    assert!(emulator.add_map_call(3, "init", 0)?);

    let call = Call::new(3, 0x10, 0xff);
    assert!(emulator.add_call(0, &call)?);
    assert_eq!(emulator.calls_count()?, 1);
    assert_eq!(emulator.call(0)?, call);
    assert_eq!(emulator.last_call()?, call);

    // unmapped code and out-of-range arguments are rejected by the engine
    assert!(!emulator.add_call(1, &Call::new(4, 0, 0))?);
    assert!(!emulator.add_call(1, &Call::new(3, 0x100, 0))?);
    assert!(!emulator.update_call(0, &Call::new(3, 0, 0x100))?);

    assert!(emulator.update_call(0, &Call::new(3, 1, 2))?);
    assert_eq!(emulator.call(0)?, Call::new(3, 1, 2));

    emulator.remove_call(0)?;
    assert_eq!(emulator.calls_count()?, 0);
    assert!(matches!(emulator.last_call(), Err(Error::ForeignException(_))));
    Ok(())
}

#[test]
fn test_map_calls() -> Result<()> {
    let (_host, mut emulator) = emulator()?;

    assert!(emulator.add_map_call(1, "init", 10)?);
    assert!(emulator.add_map_call(2, "ПУСК", 20)?);
    assert!(!emulator.add_map_call(1, "other", 30)?, "duplicate code");
    assert!(!emulator.add_map_call(3, "init", 30)?, "duplicate name");

    assert_eq!(emulator.map_call_codes()?, vec![1, 2]);
    assert_eq!(emulator.map_call_name(2)?, "ПУСК");
    assert_eq!(emulator.map_call_address(1)?, 10);
    assert_eq!(emulator.map_call(2)?, Some(MapCall::new(2, "ПУСК", 20)));
    assert_eq!(emulator.map_call(9)?, None);
    assert_eq!(
        emulator.map_call_by_name("init")?,
        Some(MapCall::new(1, "init", 10))
    );
    assert_eq!(emulator.map_call_by_name("missing")?, None);

    assert!(emulator.update_map_call(1, "start", 11)?);
    assert!(!emulator.update_map_call(1, "ПУСК", 11)?, "name taken");
    assert!(!emulator.update_map_call(9, "nine", 0)?);
    assert_eq!(
        emulator.map_calls()?,
        vec![MapCall::new(1, "start", 11), MapCall::new(2, "ПУСК", 20)]
    );

    // a code in use by a call cannot be removed
    assert!(emulator.add_call(0, &Call::new(2, 0, 0))?);
    assert!(!emulator.remove_map_call(2)?);
    assert!(emulator.remove_map_call(1)?);
    assert!(!emulator.remove_map_call(1)?);
    assert_eq!(emulator.map_call_codes()?, vec![2]);

    assert!(matches!(
        emulator.map_call_name(1),
        Err(Error::ForeignException(_))
    ));
    assert_eq!(emulator.environment().object_count()?, 1);
    Ok(())
}

#[test]
fn test_empty_tables() -> Result<()> {
    let (_host, emulator) = emulator()?;

    assert_eq!(emulator.map_call_codes()?, Vec::<i32>::new());
    assert!(emulator.map_calls()?.is_empty());
    assert_eq!(emulator.calls_count()?, 0);
    assert!(matches!(
        emulator.last_command(),
        Err(Error::ForeignException(_))
    ));
    Ok(())
}

#[test]
fn test_raw_round_trip() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    common::program(
        &mut emulator,
        &[load(1, 5), Command::new(true, 40, vec![7; 12]), ret()],
    )?;
    assert!(emulator.add_map_call(5, "main", 0)?);
    assert!(emulator.add_call(0, &Call::new(5, 1, 2))?);

    let raw = emulator.export_raw()?;
    assert!(!raw.is_empty());

    let mut copy = emulator.try_clone()?;
    copy.reset()?;
    assert!(copy.open_raw(&raw)?);
    assert_eq!(copy.export_raw()?, raw);

    // load into a wiped instance
    let (_other_host, mut fresh) = common::emulator()?;
    assert!(fresh.open_raw(&raw)?);
    assert_eq!(fresh.export_raw()?, raw);
    assert_eq!(fresh.commands_count()?, 3);
    assert_eq!(fresh.command(1)?, Command::new(true, 40, vec![7; 12]));
    assert_eq!(fresh.call(0)?, Call::new(5, 1, 2));
    assert_eq!(fresh.map_call(5)?, Some(MapCall::new(5, "main", 0)));
    Ok(())
}

#[test]
fn test_open_raw_rejects_garbage() -> Result<()> {
    let (_host, mut emulator) = emulator()?;
    common::program(&mut emulator, &[load(1, 1)])?;

    assert!(!emulator.open_raw(b"not a program")?);
    assert!(!emulator.open_raw(&[])?);
    assert_eq!(emulator.commands_count()?, 1);
    Ok(())
}

#[test]
fn test_memory_array() -> Result<()> {
    let (_host, emulator) = emulator()?;

    let memory = emulator.memory()?;
    assert_eq!(memory.len(), emulator.memory_len()?);
    assert_eq!(memory.len(), common::engine::MEM_LEN);
    assert_eq!(emulator.memory_value(17)?, memory[17]);
    assert!(matches!(
        emulator.memory_value(common::engine::MEM_LEN),
        Err(Error::ForeignException(_))
    ));
    assert_eq!(emulator.environment().object_count()?, 1);
    Ok(())
}
