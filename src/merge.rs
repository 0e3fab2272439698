use crate::layout::Rect;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Maximum difference of `top` edges for two boxes to share a line.
    pub line_tolerance: f32,
    /// Maximum horizontal gap between a line and the next box on it.
    pub gap_tolerance: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 5.0,
            gap_tolerance: 10.0,
        }
    }
}

/// Coalesces per-word boxes, given in reading order, into line regions.
///
/// Single pass, no re-sorting: a box joins the current region when it sits
/// on the same line and starts close enough to the region's right edge,
/// otherwise it opens a new region.
pub fn merge_boxes(boxes: &[Rect], config: &MergeConfig) -> Vec<Rect> {
    let mut merged: Vec<Rect> = Vec::with_capacity(boxes.len().min(8));
    for rect in boxes {
        if let Some(current) = merged.last_mut()
            && is_mergeable(current, rect, config)
        {
            *current = current.union(rect);
            continue;
        }
        merged.push(*rect);
    }
    merged
}

fn is_mergeable(current: &Rect, next: &Rect, config: &MergeConfig) -> bool {
    let same_line = (next.top - current.top).abs() < config.line_tolerance;
    let contiguous = next.left - current.right < config.gap_tolerance;
    same_line && contiguous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: f32, top: f32, right: f32, bottom: f32) -> Rect {
        Rect::new(left, top, right, bottom)
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(merge_boxes(&[], &MergeConfig::default()).is_empty());
    }

    #[test]
    fn same_line_close_boxes_merge_to_union() {
        let boxes = [rect(10.0, 100.0, 40.0, 112.0), rect(45.0, 103.0, 90.0, 114.0)];
        let merged = merge_boxes(&boxes, &MergeConfig::default());
        assert_eq!(merged, vec![rect(10.0, 100.0, 90.0, 114.0)]);
    }

    #[test]
    fn large_gap_starts_new_region() {
        let boxes = [rect(10.0, 100.0, 40.0, 112.0), rect(50.0, 100.0, 90.0, 112.0)];
        let merged = merge_boxes(&boxes, &MergeConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn line_break_starts_new_region() {
        let boxes = [
            rect(300.0, 100.0, 340.0, 112.0),
            rect(345.0, 100.0, 400.0, 112.0),
            rect(50.0, 114.0, 90.0, 126.0),
            rect(95.0, 114.0, 130.0, 126.0),
        ];
        let merged = merge_boxes(&boxes, &MergeConfig::default());
        assert_eq!(
            merged,
            vec![rect(300.0, 100.0, 400.0, 112.0), rect(50.0, 114.0, 130.0, 126.0)]
        );
    }

    #[test]
    fn tolerances_are_strict() {
        let config = MergeConfig::default();
        let boxes = [rect(0.0, 0.0, 10.0, 10.0), rect(20.0, 0.0, 30.0, 10.0)];
        assert_eq!(merge_boxes(&boxes, &config).len(), 2);
        let boxes = [rect(0.0, 0.0, 10.0, 10.0), rect(12.0, 5.0, 30.0, 15.0)];
        assert_eq!(merge_boxes(&boxes, &config).len(), 2);
    }

    #[test]
    fn output_preserves_order_and_covers_every_input() {
        let boxes = [
            rect(0.0, 0.0, 20.0, 10.0),
            rect(22.0, 1.0, 50.0, 11.0),
            rect(200.0, 0.0, 240.0, 10.0),
            rect(0.0, 14.0, 30.0, 24.0),
            rect(33.0, 14.0, 60.0, 24.0),
            rect(0.0, 28.0, 12.0, 38.0),
        ];
        let merged = merge_boxes(&boxes, &MergeConfig::default());
        assert!(merged.len() <= boxes.len());
        assert_eq!(merged.len(), 4);
        for input in &boxes {
            let covering = merged.iter().filter(|out| out.contains(input)).count();
            assert_eq!(covering, 1, "{input:?}");
        }
        let tops: Vec<f32> = merged.iter().map(|r| r.top).collect();
        assert_eq!(tops, vec![0.0, 0.0, 14.0, 28.0]);
    }
}
