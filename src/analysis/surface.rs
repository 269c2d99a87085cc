/// An opaque RGB color.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const ORANGE: Color = Color::rgb(0xff, 0x66, 0x00);
    pub const RED: Color = Color::rgb(0xff, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A 2D target the visualizations draw onto.
///
/// Coordinates are in pixels with the origin at the top-left corner.
/// Rectangles may extend past the edges; implementations clip.
pub trait Surface {
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color);

    /// Paint the whole surface.
    fn clear(&mut self, color: Color) {
        let (w, h) = (self.width(), self.height());
        self.fill_rect(0.0, 0.0, w, h, color);
    }
}
