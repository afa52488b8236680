// Image grid widget: fixed rows x columns of generated pictures
// Placement is decided by GridModel; the widget only mirrors it into row boxes

use gdk4::Texture;
use glib::Object;
use gtk4::prelude::*;
use gtk4::subclass::prelude::*;
use gtk4::{gdk, glib, Align, Box as GtkBox, ContentFit, Orientation, Picture};
use std::cell::RefCell;

use crate::controller::CycleOutcome;
use crate::models::{AppendOutcome, GeneratedImage, GridModel, ImageSink};

/// Gap between rows and between pictures in a row.
pub const GRID_SPACING: i32 = 8;

/// Inset around the whole grid.
const GRID_MARGIN: i32 = 8;

/// Size used before the grid has been allocated.
const UNALLOCATED_EDGE_PX: i32 = 512;

/// Size of one slot for a grid allocated at `width` x `height`.
///
/// The allocation already excludes the grid's own margins, so each axis is
/// split evenly between its slots after the gaps; for a 2x2 grid that is
/// half the grid per axis. Never returns less than 1px.
pub fn slot_size(width: i32, height: i32, rows: usize, columns: usize) -> (i32, i32) {
    let rows = rows.max(1) as i32;
    let columns = columns.max(1) as i32;
    let usable_w = width - (columns - 1) * GRID_SPACING;
    let usable_h = height - (rows - 1) * GRID_SPACING;
    ((usable_w / columns).max(1), (usable_h / rows).max(1))
}

fn texture_for(image: &GeneratedImage) -> Option<Texture> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return None;
    }
    let bytes = glib::Bytes::from_owned(image.pixels().as_raw().clone());
    let texture = gdk::MemoryTexture::new(
        width as i32,
        height as i32,
        gdk::MemoryFormat::R8g8b8a8,
        &bytes,
        (width * 4) as usize,
    );
    Some(texture.upcast())
}

mod imp {
    use super::*;

    #[derive(Default)]
    pub struct ImageGridInner {
        pub row_boxes: RefCell<Vec<GtkBox>>,
        pub model: RefCell<Option<GridModel<Picture>>>,
    }

    #[glib::object_subclass]
    impl ObjectSubclass for ImageGridInner {
        const NAME: &'static str = "FluidCanvasImageGrid";
        type Type = super::ImageGrid;
        type ParentType = GtkBox;
    }

    impl ObjectImpl for ImageGridInner {
        fn constructed(&self) {
            self.parent_constructed();

            let obj = self.obj();
            obj.set_orientation(Orientation::Vertical);
            obj.set_spacing(GRID_SPACING);
            obj.set_homogeneous(true);
            obj.set_margin_top(GRID_MARGIN);
            obj.set_margin_bottom(GRID_MARGIN);
            obj.set_margin_start(GRID_MARGIN);
            obj.set_margin_end(GRID_MARGIN);
            obj.set_hexpand(true);
            obj.set_vexpand(true);
            obj.add_css_class("image-grid");
        }
    }

    impl WidgetImpl for ImageGridInner {}
    impl BoxImpl for ImageGridInner {}
}

glib::wrapper! {
    pub struct ImageGrid(ObjectSubclass<imp::ImageGridInner>)
        @extends GtkBox, gtk4::Widget,
        @implements gtk4::Accessible, gtk4::Buildable, gtk4::ConstraintTarget, gtk4::Orientable;
}

impl ImageGrid {
    /// Create a grid with fixed capacity `rows * columns`.
    pub fn new(rows: usize, columns: usize) -> Self {
        let grid: Self = Object::builder().build();
        let model = GridModel::new(rows, columns);

        let container: &GtkBox = grid.upcast_ref();
        let mut row_boxes = Vec::with_capacity(model.rows());
        for _ in 0..model.rows() {
            let row = GtkBox::new(Orientation::Horizontal, GRID_SPACING);
            row.set_homogeneous(true);
            row.set_halign(Align::Fill);
            row.set_hexpand(true);
            row.add_css_class("grid-row");
            container.append(&row);
            row_boxes.push(row);
        }

        let imp = grid.imp();
        *imp.row_boxes.borrow_mut() = row_boxes;
        *imp.model.borrow_mut() = Some(model);
        grid
    }

    /// Remove every picture. Row containers stay in place.
    pub fn clear(&self) {
        if let Some(model) = self.imp().model.borrow_mut().as_mut() {
            model.clear();
        }
        self.sync_rows();
    }

    /// Add images in row-major order; images beyond capacity are dropped.
    pub fn append(&self, images: Vec<GeneratedImage>) -> AppendOutcome {
        let slot = self.current_slot_size();
        let outcome = match self.imp().model.borrow_mut().as_mut() {
            Some(model) => {
                let pictures: Vec<Picture> = images
                    .iter()
                    .filter_map(|image| Self::picture_for(image, slot))
                    .collect();
                model.append(pictures)
            }
            None => AppendOutcome::default(),
        };
        self.sync_rows();
        outcome
    }

    /// Apply a finished generation cycle. Only a completed cycle changes
    /// what is shown.
    pub fn apply(&self, outcome: CycleOutcome) -> Option<AppendOutcome> {
        let mut sink = self.clone();
        outcome.apply(&mut sink)
    }

    /// Number of pictures currently shown.
    pub fn image_count(&self) -> usize {
        self.imp()
            .model
            .borrow()
            .as_ref()
            .map(GridModel::len)
            .unwrap_or(0)
    }

    /// Re-derive picture sizes from the grid's allocation.
    pub fn relayout(&self) {
        let (w, h) = self.current_slot_size();
        if let Some(model) = self.imp().model.borrow().as_ref() {
            for picture in model.iter() {
                picture.set_size_request(w, h);
            }
        }
    }

    fn current_slot_size(&self) -> (i32, i32) {
        let (rows, columns) = self
            .imp()
            .model
            .borrow()
            .as_ref()
            .map(|m| (m.rows(), m.columns()))
            .unwrap_or((1, 1));
        let width = self.width();
        let height = self.height();
        let width = if width > 0 { width } else { UNALLOCATED_EDGE_PX };
        let height = if height > 0 { height } else { UNALLOCATED_EDGE_PX };
        slot_size(width, height, rows, columns)
    }

    fn picture_for(image: &GeneratedImage, (w, h): (i32, i32)) -> Option<Picture> {
        let texture = texture_for(image)?;
        let picture = Picture::for_paintable(&texture);
        // Allow shrinking below the texture size, otherwise large outputs
        // push the window wider than the grid.
        picture.set_can_shrink(true);
        picture.set_content_fit(ContentFit::Contain);
        picture.set_halign(Align::Center);
        picture.set_valign(Align::Center);
        picture.set_size_request(w, h);
        picture.add_css_class("grid-image");
        Some(picture)
    }

    // Rebuild row children from the model
    fn sync_rows(&self) {
        let imp = self.imp();
        let row_boxes = imp.row_boxes.borrow();
        let model = imp.model.borrow();
        for (index, row_box) in row_boxes.iter().enumerate() {
            while let Some(child) = row_box.first_child() {
                row_box.remove(&child);
            }
            if let Some(pictures) = model.as_ref().and_then(|m| m.row(index)) {
                for picture in pictures {
                    row_box.append(picture);
                }
            }
        }
    }
}

impl ImageSink for ImageGrid {
    fn clear(&mut self) {
        ImageGrid::clear(self);
    }

    fn append(&mut self, images: Vec<GeneratedImage>) -> AppendOutcome {
        ImageGrid::append(self, images)
    }
}
