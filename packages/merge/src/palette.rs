//! Color palettes for metrics whose colors are assigned by position.

/// Twenty paired colors, dark then light.
pub const TAB20: [&str; 20] = [
    "#1f77b4", "#aec7e8", "#ff7f0e", "#ffbb78", "#2ca02c", "#98df8a", "#d62728", "#ff9896",
    "#9467bd", "#c5b0d5", "#8c564b", "#c49c94", "#e377c2", "#f7b6d2", "#7f7f7f", "#c7c7c7",
    "#bcbd22", "#dbdb8d", "#17becf", "#9edae5",
];

/// Twenty colors in five hue groups of four shades.
pub const TAB20B: [&str; 20] = [
    "#393b79", "#5254a3", "#6b6ecf", "#9c9ede", "#637939", "#8ca252", "#b5cf6b", "#cedb9c",
    "#8c6d31", "#bd9e39", "#e7ba52", "#e7cb94", "#843c39", "#ad494a", "#d6616b", "#e7969c",
    "#7b4173", "#a55194", "#ce6dbd", "#de9ed6",
];

/// Twenty colors in five hue groups of four shades, blue first.
pub const TAB20C: [&str; 20] = [
    "#3182bd", "#6baed6", "#9ecae1", "#c6dbef", "#e6550d", "#fd8d3c", "#fdae6b", "#fdd0a2",
    "#31a354", "#74c476", "#a1d99b", "#c7e9c0", "#756bb1", "#9e9ac8", "#bcbddc", "#dadaeb",
    "#636363", "#969696", "#bdbdbd", "#d9d9d9",
];

/// Light gray used for remainder series.
pub const LIGHT_GRAY: &str = "#e6e6e6";

/// Color `i` of `palette`, wrapping around.
#[must_use]
pub const fn cycle(palette: &[&'static str; 20], i: usize) -> &'static str {
    palette[i % palette.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wraps() {
        assert_eq!(cycle(&TAB20, 0), cycle(&TAB20, 20));
        assert_eq!(cycle(&TAB20B, 23), "#9c9ede");
    }
}
