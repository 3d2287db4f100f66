const ENTITIES: &[(char, &str)] = &[
    ('&', "&amp;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quot;"),
    ('\'', "&#x27;"),
    ('/', "&#x2F;"),
    ('`', "&#x60;"),
    ('=', "&#x3D;"),
];

/// HTML-entity escapes visitor text before it enters a transcript that may be
/// rendered back into a page.
pub fn sanitize_input(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for character in input.chars() {
        match ENTITIES.iter().find(|(raw, _)| *raw == character) {
            Some((_, entity)) => escaped.push_str(entity),
            None => escaped.push(character),
        }
    }
    escaped
}

/// Inverse of [`sanitize_input`]: the text as the visitor typed it.
///
/// Decodes in a single left-to-right pass, so `&amp;lt;` comes back as `&lt;`.
/// Entities `sanitize_input` never emits are left alone.
pub fn restore_input(input: &str) -> String {
    let mut restored = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(position) = rest.find('&') {
        restored.push_str(&rest[..position]);
        rest = &rest[position..];
        match ENTITIES.iter().find(|(_, entity)| rest.starts_with(entity)) {
            Some((raw, entity)) => {
                restored.push(*raw);
                rest = &rest[entity.len()..];
            }
            None => {
                restored.push('&');
                rest = &rest[1..];
            }
        }
    }
    restored.push_str(rest);
    restored
}

#[cfg(test)]
mod tests {
    use super::{restore_input, sanitize_input};

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            sanitize_input("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt;"
        );
        assert_eq!(sanitize_input("a=b & `c`"), "a&#x3D;b &amp; &#x60;c&#x60;");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(sanitize_input("We process 300 invoices a week"), "We process 300 invoices a week");
        assert_eq!(restore_input("We process 300 invoices a week"), "We process 300 invoices a week");
    }

    #[test]
    fn restore_recovers_what_the_visitor_typed() {
        let typed = "I'm Sean O'Brien from Smith & Sons, see https://smith.ie/?a=1";
        assert_eq!(restore_input(&sanitize_input(typed)), typed);
    }

    #[test]
    fn restore_decodes_only_one_level() {
        assert_eq!(restore_input("&amp;lt;b&amp;gt;"), "&lt;b&gt;");
        assert_eq!(restore_input("R&D &copy; 50% & more"), "R&D &copy; 50% & more");
    }
}
