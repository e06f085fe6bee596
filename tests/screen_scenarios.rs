//! End-to-end byte-stream scenarios against the full screen pipeline.

use vtcore::color::{Color, RgbColor};
use vtcore::commands::Coordinate;
use vtcore::events::MockScreenEvents;
use vtcore::screen::Screen;
use vtcore::screen_buffer::{CellStyle, ScreenSize};
use vtcore::selection::SelectionMode;

fn screen(columns: i32, rows: i32) -> Screen<MockScreenEvents> {
    Screen::new(
        ScreenSize::new(columns, rows),
        1000,
        MockScreenEvents::default(),
    )
}

#[test]
fn linear_selection_over_written_grid() {
    let mut s = screen(5, 5);
    s.write_str("12 45\r\n678 0\r\nA CDE\r\nFGHIJ\r\nKLMNO");

    assert_eq!(s.render_text(), "12 45\n678 0\nA CDE\nFGHIJ\nKLMNO\n");

    s.begin_selection(SelectionMode::Linear, Coordinate::new(2, 2));
    s.extend_selection(Coordinate::new(2, 4));
    s.complete_selection();

    assert_eq!(s.selected_text(), "78 ");
    assert_eq!(s.events().selection_completions, 1);
}

#[test]
fn erase_display_keeps_cursor_and_scrollback() {
    let mut s = screen(4, 3);
    s.write_str("a\r\nb\r\nc\r\nd\r\ne");
    let history = s.history_line_count();
    assert!(history > 0);
    let cursor = s.cursor_position();

    s.write_str("\x1b[2J");

    assert_eq!(s.render_text(), "    \n    \n    \n");
    assert_eq!(s.cursor_position(), cursor);
    assert_eq!(s.history_line_count(), history);
}

#[test]
fn truecolor_sgr_applies_to_written_cell() {
    let mut s = screen(5, 2);
    s.write_str("\x1b[38;2;10;20;30mA");
    let cell = s.buffer().line(1).cell(1).unwrap();
    assert_eq!(cell.codepoint(0), Some('A'));
    assert_eq!(
        cell.attributes.foreground,
        Color::Rgb(RgbColor::new(10, 20, 30))
    );
}

#[test]
fn alternate_screen_roundtrip_preserves_primary() {
    let mut s = screen(6, 3);
    s.write_str("hello\r\nworld");
    let saved_cursor = s.cursor_position();

    s.write_str("\x1b[?1049h\x1b[2JX\x1b[?1049l");

    assert_eq!(s.render_text(), "hello \nworld \n      \n");
    assert_eq!(s.cursor_position(), saved_cursor);
}

#[test]
fn autowrap_with_scroll_on_last_row() {
    let mut s = screen(10, 3);
    s.write_str("\x1b[3;10H");
    assert_eq!(s.cursor_position(), Coordinate::new(3, 10));

    s.write_str("ab");

    // 'a' landed in the last column of the last row, which then scrolled
    // away; 'b' starts the new bottom row.
    assert_eq!(s.render_text_line(2).chars().nth(9), Some('a'));
    assert_eq!(s.render_text_line(3).chars().next(), Some('b'));
    assert_eq!(s.cursor_position(), Coordinate::new(3, 2));
}

#[test]
fn hyperlinked_cells_share_one_record() {
    let mut s = screen(10, 2);
    s.write_str("\x1b]8;id=x;https://example.com\x1b\\Hi\x1b]8;;\x1b\\!");

    let buffer = s.buffer();
    let h = buffer.line(1).cell(1).unwrap().hyperlink().cloned().unwrap();
    let i = buffer.line(1).cell(2).unwrap().hyperlink().cloned().unwrap();
    assert!(std::sync::Arc::ptr_eq(&h, &i));
    assert_eq!(h.id, "x");
    assert_eq!(h.uri, "https://example.com");
    assert!(buffer.line(1).cell(3).unwrap().hyperlink().is_none());
}

#[test]
fn grid_invariants_hold_after_arbitrary_writes() {
    let mut s = screen(8, 4);
    s.write_str("\x1b[2;3r\x1b[?6h");
    s.write_str("some text that wraps around and scrolls\r\n");
    s.write_str("\x1b[5;20H\x1b[1;31mmore\x1b[0m\r\n\x1b[2J\x1b[3Cfin");
    s.write_str("日本語テキスト");

    let buffer = s.buffer();
    for row in 1..=4 {
        assert_eq!(buffer.line(row).len(), 8, "row {row} width");
        for column in 1..=8 {
            let cell = buffer.cell_at(Coordinate::new(row, column)).unwrap();
            assert!(cell.width() <= 2);
            if cell.width() == 0 {
                let base = buffer.cell_at(Coordinate::new(row, column - 1)).unwrap();
                assert!(base.width() >= 1, "width-0 cell must follow a base");
            }
        }
    }

    let cursor = s.real_cursor_position();
    assert!((1..=4).contains(&cursor.row));
    assert!((1..=8).contains(&cursor.column));
    assert!(s.history_line_count() <= 1000);
}

#[test]
fn charset_translation_applies_to_ascii_only() {
    let mut s = screen(6, 1);
    s.write_str("\x1b(0qqx\x1b(Bq");
    assert_eq!(s.render_text_line(1), "──│q  ");
}

#[test]
fn wide_chars_wrap_as_units() {
    let mut s = screen(5, 2);
    s.write_str("ab日本");
    // '日' occupies columns 3-4; '本' does not fit into column 5 alone,
    // so it wraps to the next line.
    assert_eq!(s.render_text_line(1), "ab日 ");
    assert_eq!(s.render_text_line(2), "本   ");
}

#[test]
fn styled_output_roundtrip_through_generator() {
    use vtcore::builder::CommandBuilder;
    use vtcore::commands::Command;
    use vtcore::output::OutputGenerator;
    use vtcore::parser::Parser;

    // screen-applied commands, re-emitted, re-parsed, re-applied: same grid
    let commands = vec![
        Command::SetGraphicsRendition(vtcore::commands::GraphicsRendition::Bold),
        Command::SetForegroundColor(Color::Rgb(RgbColor::new(200, 100, 50))),
        Command::AppendChar('o'),
        Command::AppendChar('k'),
    ];

    let mut first = screen(5, 1);
    for command in &commands {
        first.write_command(command.clone());
    }

    let mut generator = OutputGenerator::new();
    generator.emit_all(&commands);
    let bytes = generator.take();

    let mut parser = Parser::new();
    let mut builder = CommandBuilder::new();
    parser.parse(&bytes, &mut builder);

    let mut second = screen(5, 1);
    for command in builder.take_commands() {
        second.write_command(command);
    }

    assert_eq!(first.render_text(), second.render_text());
    let cell = second.buffer().line(1).cell(1).unwrap();
    assert!(cell.attributes.styles.contains(CellStyle::BOLD));
    assert_eq!(
        cell.attributes.foreground,
        Color::Rgb(RgbColor::new(200, 100, 50))
    );
}

#[test]
fn selection_survives_writes_outside_it() {
    let mut s = screen(5, 2);
    s.write_str("abcde");
    s.begin_selection(SelectionMode::Linear, Coordinate::new(1, 1));
    s.extend_selection(Coordinate::new(1, 3));
    s.complete_selection();
    assert_eq!(s.selected_text(), "abc");

    // overwrite content inside the selection: coordinates stay, content
    // changes
    s.write_str("\x1b[1;2HX");
    assert_eq!(s.selected_text(), "aXc");
}

#[test]
fn scrollback_is_bounded_fifo() {
    let mut s = Screen::new(ScreenSize::new(3, 2), 3, MockScreenEvents::default());
    for i in 0..10 {
        s.write_str(&format!("{i}\r\n"));
    }
    assert_eq!(s.history_line_count(), 3);
}

#[test]
fn cpr_uses_logical_coordinates_under_origin_mode() {
    let mut s = screen(10, 6);
    s.write_str("\x1b[3;5r\x1b[?6h\x1b[2;2H\x1b[6n");
    // logical (2,2) == real (4,2)
    assert_eq!(s.events().reply_text(), "\x1b[2;2R");
    assert_eq!(s.real_cursor_position(), Coordinate::new(4, 2));
}

#[test]
fn resize_preserves_content_deterministically() {
    let mut s = screen(6, 3);
    s.write_str("one\r\ntwo\r\nsix");
    s.resize(ScreenSize::new(4, 3));
    assert_eq!(s.render_text(), "one \ntwo \nsix \n");
    s.resize(ScreenSize::new(8, 2));
    // cursor was on the last row, so the top line went into history
    assert_eq!(s.history_line_count(), 1);
    assert_eq!(s.render_text_line(0), "one     ");
}
