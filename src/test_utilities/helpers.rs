//! Assertion macros for integration tests

#[macro_export]
macro_rules! is {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(cocoa::Error::new(format!(
                "Failed == check because the value {:#?} != {:#?}",
                $left, $right
            )));
        }
    };
}

#[macro_export]
macro_rules! is_not {
    ($left:expr, $right:expr) => {
        if $left == $right {
            return Err(cocoa::Error::new(format!(
                "Failed != check {:#?} == {:#?}",
                $left, $right
            )));
        }
    };
}

#[macro_export]
macro_rules! is_in {
    ($list:expr, $item:expr) => {
        if !$list.iter().any(|x| *x == $item) {
            return Err(cocoa::Error::new(format!(
                "Failed is_in check because {:#?} is not in {:#?}",
                $item, $list
            )));
        }
    };
}

#[macro_export]
macro_rules! fail {
    ($result:expr, $kind:expr) => {
        match $result {
            Ok(_) => {
                return Err(cocoa::Error::new(format!(
                    "Expected a {:?} failure but the call succeeded",
                    $kind
                )))
            }
            Err(err) => {
                if err.kind() != $kind {
                    return Err(cocoa::Error::new(format!(
                        "Expected a {:?} failure but got {:?}: {}",
                        $kind,
                        err.kind(),
                        err
                    )));
                }
            }
        }
    };
}
