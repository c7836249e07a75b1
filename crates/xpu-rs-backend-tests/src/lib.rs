pub mod concat;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use std::sync::Arc;

            use $crate::concat;

            macro_rules! backend_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        let backend = ($backend_ctor)();
                        concat::$name(&backend);
                    }
                };
            }

            backend_test!(horizontal_concat_2x3_2x4);
            backend_test!(axis_extent_is_sum_of_inputs);
            backend_test!(skipped_inputs_are_ignored);
            backend_test!(all_skipped_inputs_leave_output_alone);
            backend_test!(rejects_empty_input_list);
            backend_test!(shape_mismatch_leaves_output_untouched);
            backend_test!(rejects_output_aliasing_an_input);
            backend_test!(rejects_out_of_range_dims);
            backend_test!(negative_dim_wraps_at_dispatch);
            backend_test!(concat_into_reuses_sized_output);
            backend_test!(concat_spanning_multiple_batches);
            backend_test!(uneven_inputs_across_three_batches);
            backend_test!(channels_last_inputs_match_row_major);
            backend_test!(permuted_inputs_are_copied_logically);
            backend_test!(mixed_dtypes_promote);
            backend_test!(rejects_uncastable_output);
            backend_test!(narrow_types_roundtrip);
            backend_test!(matches_reference_backend);
        }
    };
}
