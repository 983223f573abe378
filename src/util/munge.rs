/// Replaces the first character of `name` with a look-alike so that echoing a username back into
/// chat neither pings that user nor re-triggers a karma command.
///
/// Characters without a look-alike are left untouched.
pub fn munge(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    match lookalike(first) {
        Some(replacement) => {
            let mut out = String::with_capacity(name.len() + 2);
            out.push(replacement);
            out.push_str(chars.as_str());
            out
        }
        None => name.to_owned(),
    }
}

fn lookalike(ch: char) -> Option<char> {
    Some(match ch {
        'a' => '\u{00e4}',
        'b' => '\u{0411}',
        'c' => '\u{010b}',
        'd' => '\u{0111}',
        'e' => '\u{00eb}',
        'f' => '\u{0192}',
        'g' => '\u{0121}',
        'h' => '\u{0127}',
        'i' => '\u{00ed}',
        'j' => '\u{0135}',
        'k' => '\u{0137}',
        'l' => '\u{013a}',
        'm' => '\u{1e41}',
        'n' => '\u{00f1}',
        'o' => '\u{00f6}',
        'p' => '\u{03c1}',
        'q' => '\u{02a0}',
        'r' => '\u{0157}',
        's' => '\u{0161}',
        't' => '\u{0163}',
        'u' => '\u{00fc}',
        'v' => '\u{03bd}',
        'w' => '\u{03c9}',
        'x' => '\u{03c7}',
        'y' => '\u{00ff}',
        'z' => '\u{017a}',
        'A' => '\u{00c5}',
        'B' => '\u{0392}',
        'C' => '\u{00c7}',
        'D' => '\u{010e}',
        'E' => '\u{0112}',
        'F' => '\u{1e1e}',
        'G' => '\u{0120}',
        'H' => '\u{0126}',
        'I' => '\u{00cd}',
        'J' => '\u{0134}',
        'K' => '\u{0136}',
        'L' => '\u{0139}',
        'M' => '\u{039c}',
        'N' => '\u{039d}',
        'O' => '\u{00d6}',
        'P' => '\u{0420}',
        'Q' => '\u{ff31}',
        'R' => '\u{0156}',
        'S' => '\u{0160}',
        'T' => '\u{0162}',
        'U' => '\u{016e}',
        'V' => '\u{1e7e}',
        'W' => '\u{0174}',
        'X' => '\u{03a7}',
        'Y' => '\u{1ef2}',
        'Z' => '\u{017b}',
        _ => return None,
    })
}
