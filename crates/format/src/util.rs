use crate::{Format, ImageFormat};
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Format {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl Format {
    /// Returns the short name (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Zip => "zip",
            Format::Rar => "rar",
            Format::Tar => "tar",
            Format::SevenZip => "7z",
            Format::Pdf => "pdf",
        }
    }
}

impl ImageFormat {
    /// Returns the short name (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Avif => "avif",
            ImageFormat::JpegXl => "jxl",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Format;
    use rstest::rstest;

    #[rstest]
    #[case(Format::Zip, ".cbz")]
    #[case(Format::Rar, ".cbr")]
    #[case(Format::Tar, ".cbt")]
    #[case(Format::SevenZip, ".cb7")]
    #[case(Format::Pdf, ".pdf")]
    fn comic_extensions(#[case] format: Format, #[case] extension: &str) {
        assert_eq!(Format::from_path(format!("comic{extension}")), Some(format));
    }
}
