mod optimizer_test;
